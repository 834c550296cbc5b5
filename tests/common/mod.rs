#![allow(dead_code)]

use pos_reconcile::application::orchestrator::PaymentOrchestrator;
use pos_reconcile::config::ReconcileConfig;
use pos_reconcile::domain::amount::Amount;
use pos_reconcile::domain::message::{
    MessageCategory, MessageHeader, OutboundMessage, PaymentRequest, TransactionId,
    TransactionReference,
};
use pos_reconcile::infrastructure::simulated::SimulatedTerminal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;

pub const SALE_ID: &str = "SALE-01";
pub const POI_ID: &str = "POI-01";

#[derive(Debug, Clone, Copy)]
pub enum Style {
    Direct,
    Notified,
}

pub const STYLES: [Style; 2] = [Style::Direct, Style::Notified];

pub fn terminal() -> Arc<SimulatedTerminal> {
    Arc::new(SimulatedTerminal::new(SALE_ID, POI_ID))
}

/// Poll every 10s within a 60s budget.
pub fn config() -> ReconcileConfig {
    ReconcileConfig::default()
        .with_identity(SALE_ID, POI_ID)
        .with_poll_interval(Duration::from_secs(10))
        .with_budget(Duration::from_secs(60))
        .with_attempt_timeout(Duration::from_secs(30))
        .with_payment_response_timeout(Duration::from_secs(120))
}

pub fn orchestrator(
    style: Style,
    terminal: &Arc<SimulatedTerminal>,
    config: ReconcileConfig,
) -> PaymentOrchestrator {
    match style {
        Style::Direct => PaymentOrchestrator::direct(terminal.clone(), config),
        Style::Notified => PaymentOrchestrator::notified(terminal.clone(), config),
    }
}

pub fn request(id: &str) -> PaymentRequest {
    let mut request = PaymentRequest::new(TransactionId::new(id), Amount::new(dec!(42.00)).unwrap());
    request.add_sale_item("XXYYZZ123", "Name of product", Amount::new(dec!(42.00)).unwrap());
    request
}

pub fn payment_reference(service_id: &str) -> TransactionReference {
    TransactionReference::from(&MessageHeader {
        category: MessageCategory::Payment,
        sale_id: SALE_ID.to_string(),
        poi_id: POI_ID.to_string(),
        service_id: service_id.to_string(),
    })
}

/// References carried by the status queries the terminal received, in order.
pub fn queried_references(terminal: &SimulatedTerminal) -> Vec<TransactionReference> {
    terminal
        .sent()
        .into_iter()
        .filter_map(|message| match message {
            OutboundMessage::TransactionStatus(query) => Some(query.message_reference),
            _ => None,
        })
        .collect()
}
