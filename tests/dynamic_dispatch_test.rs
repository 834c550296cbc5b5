mod common;

use common::{config, request, terminal};
use pos_reconcile::application::orchestrator::PaymentOrchestrator;
use pos_reconcile::application::responses::DirectResponses;
use pos_reconcile::domain::message::{MessageCategory, Notification};
use pos_reconcile::domain::ports::{
    NotificationHandler, SharedHandler, SharedStrategy, SharedTransport,
};
use pos_reconcile::infrastructure::simulated::Step;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Counter {
    payments: Mutex<usize>,
}

impl NotificationHandler for Counter {
    fn handle(&self, notification: &Notification) {
        if let Notification::Payment(_) = notification {
            *self.payments.lock().unwrap() += 1;
        }
    }
}

#[tokio::test]
async fn test_ports_as_trait_objects() {
    let simulated = terminal();
    simulated.on_payment(Step::approved());

    let transport: SharedTransport = simulated.clone();
    let responses: SharedStrategy = Arc::new(DirectResponses::new(transport.clone()));
    let orchestrator = Arc::new(PaymentOrchestrator::new(transport, responses, config()));

    // Verify Send + Sync by running the payment on another task
    let handle = tokio::spawn({
        let orchestrator = orchestrator.clone();
        async move { orchestrator.execute_payment(request("tx-1")).await }
    });

    assert!(handle.await.unwrap().is_success());
    assert_eq!(simulated.sent_count(MessageCategory::Payment), 1);
}

#[tokio::test]
async fn test_extra_handlers_see_dispatched_traffic() {
    let simulated = terminal();
    simulated.on_payment(Step::approved());
    let counter = Arc::new(Counter::default());

    let orchestrator = PaymentOrchestrator::notified_with_handlers(
        simulated.clone(),
        config(),
        vec![counter.clone() as SharedHandler],
    );
    let outcome = orchestrator.execute_payment(request("tx-1")).await;

    assert!(outcome.is_success());
    assert_eq!(*counter.payments.lock().unwrap(), 1);
}
