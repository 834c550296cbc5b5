use super::dispatch::{Dispatcher, Listener, LoggingHandler};
use super::recovery::RecoveryResolver;
use super::responses::{DirectResponses, NotifiedResponses};
use crate::config::ReconcileConfig;
use crate::domain::expectation::Expectation;
use crate::domain::message::{
    LoginRequest, LoginResponse, Notification, OutboundMessage, PaymentRequest,
    TransactionReference,
};
use crate::domain::outcome::{PaymentOutcome, Resolution};
use crate::domain::ports::{SharedHandler, SharedStrategy, SharedTransport};
use crate::error::{Result, TransportError};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// Drives one payment at a time from submission to a definitive outcome.
///
/// The orchestrator sends exactly one payment request per call and waits for
/// the response correlated by sale transaction id. If the wait fails after
/// the request left the process, the outcome is settled by the
/// [`RecoveryResolver`] before returning. Calls are serialised: a second
/// [`execute_payment`](Self::execute_payment) waits for the first to finish,
/// recovery included.
pub struct PaymentOrchestrator {
    transport: SharedTransport,
    responses: SharedStrategy,
    resolver: RecoveryResolver,
    config: ReconcileConfig,
    turn: Mutex<()>,
    listener: Option<Listener>,
}

impl PaymentOrchestrator {
    pub fn new(
        transport: SharedTransport,
        responses: SharedStrategy,
        config: ReconcileConfig,
    ) -> Self {
        let resolver = RecoveryResolver::new(transport.clone(), responses.clone(), &config);
        Self {
            transport,
            responses,
            resolver,
            config,
            turn: Mutex::new(()),
            listener: None,
        }
    }

    /// Reads responses inline on the calling task.
    pub fn direct(transport: SharedTransport, config: ReconcileConfig) -> Self {
        let responses = Arc::new(DirectResponses::new(transport.clone()));
        Self::new(transport, responses, config)
    }

    /// Receives responses through a background listener and a one-shot gate.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn notified(transport: SharedTransport, config: ReconcileConfig) -> Self {
        Self::notified_with_handlers(transport, config, Vec::new())
    }

    /// Like [`notified`](Self::notified), also posting every notification to `handlers`.
    pub fn notified_with_handlers(
        transport: SharedTransport,
        config: ReconcileConfig,
        handlers: Vec<SharedHandler>,
    ) -> Self {
        let gate = Arc::new(NotifiedResponses::new());
        let mut dispatcher = Dispatcher::new();
        dispatcher.register(Arc::new(LoggingHandler));
        for handler in handlers {
            dispatcher.register(handler);
        }
        dispatcher.register(gate.clone());
        let listener = Arc::new(dispatcher).spawn_listener(transport.clone());

        let mut orchestrator = Self::new(transport, gate, config);
        orchestrator.listener = Some(listener);
        orchestrator
    }

    pub fn resolver(&self) -> &RecoveryResolver {
        &self.resolver
    }

    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    pub fn is_listening(&self) -> bool {
        self.listener.as_ref().is_some_and(Listener::is_running)
    }

    /// Logs in explicitly and waits for the login response.
    pub async fn login(&self, request: LoginRequest) -> Result<LoginResponse> {
        let _turn = self.turn.lock().await;
        self.transport.connect().await?;
        self.responses.expect(Expectation::Login).await;
        self.transport.send(OutboundMessage::Login(request)).await?;
        match self.responses.wait(self.config.login_timeout).await? {
            Notification::Login(response) => {
                info!(result = ?response.response.result, "Login result");
                Ok(response)
            }
            other => Err(TransportError::Protocol(format!(
                "unexpected reply to login: {:?}",
                other
            ))
            .into()),
        }
    }

    /// Submits `request` and returns its definitive outcome.
    ///
    /// Never returns while the outcome is still ambiguous: either the direct
    /// response arrived, or recovery settled it, or the request provably never
    /// reached the terminal.
    pub async fn execute_payment(&self, request: PaymentRequest) -> PaymentOutcome {
        let _turn = self.turn.lock().await;
        let sale_tx = request.sale_transaction_id.clone();
        info!(%sale_tx, amount = %request.requested_amount, items = request.sale_items.len(), "Submitting payment");

        if let Err(e) = request.validate() {
            warn!(%sale_tx, error = %e, "Payment request rejected");
            return PaymentOutcome::failed(e.to_string());
        }
        if let Err(e) = self.transport.connect().await {
            warn!(%sale_tx, error = %e, "Unable to connect, payment not sent");
            return PaymentOutcome::failed(e.to_string());
        }

        self.responses
            .expect(Expectation::Payment(sale_tx.clone()))
            .await;
        let header = match self.transport.send(OutboundMessage::Payment(request)).await {
            Ok(header) => header,
            Err(e) => {
                warn!(%sale_tx, error = %e, "Payment request was not transmitted");
                return PaymentOutcome::failed(e.to_string());
            }
        };
        let reference = TransactionReference::from(&header);
        self.resolver.track(reference.clone());

        match self
            .responses
            .wait(self.config.payment_response_timeout)
            .await
        {
            Ok(Notification::Payment(response)) => {
                self.resolver.release();
                let outcome = PaymentOutcome::from_payment(&response);
                info!(%sale_tx, %outcome, "Payment result");
                outcome
            }
            Ok(other) => {
                self.resolver.release();
                error!(%sale_tx, ?other, "Unexpected reply to payment");
                PaymentOutcome::failed("unexpected reply to payment request")
            }
            Err(e) if e.is_recovery_required() => {
                warn!(%sale_tx, error = %e, "Exception processing payment");
                let initial_delay = e
                    .is_disconnect()
                    .then_some(self.resolver.poll_interval());
                self.recover(&reference, initial_delay).await
            }
            Err(e) => {
                self.resolver.release();
                error!(%sale_tx, error = %e, "Exception processing payment, recovery not possible");
                PaymentOutcome::failed(e.to_string())
            }
        }
    }

    async fn recover(
        &self,
        reference: &TransactionReference,
        initial_delay: Option<std::time::Duration>,
    ) -> PaymentOutcome {
        match self.resolver.resolve(initial_delay).await {
            Resolution::Resolved(outcome) => outcome,
            // Another trigger already settled it.
            Resolution::NothingOutstanding => self
                .resolver
                .settled(reference)
                .unwrap_or_else(|| PaymentOutcome::undetermined(None)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::amount::Amount;
    use crate::domain::message::{MessageCategory, Response, TransactionId};
    use crate::domain::outcome::Outcome;
    use crate::infrastructure::simulated::{SimulatedTerminal, Step};
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn request(id: &str) -> PaymentRequest {
        PaymentRequest::new(TransactionId::new(id), Amount::new(dec!(42.00)).unwrap())
    }

    fn config() -> ReconcileConfig {
        ReconcileConfig::default().with_identity("SALE", "POI")
    }

    #[tokio::test]
    async fn test_direct_response_skips_recovery() {
        let terminal = Arc::new(SimulatedTerminal::new("SALE", "POI"));
        terminal.on_payment(Step::approved());
        let orchestrator = PaymentOrchestrator::direct(terminal.clone(), config());

        let outcome = orchestrator.execute_payment(request("1")).await;
        assert!(outcome.is_success());
        assert_eq!(terminal.sent_count(MessageCategory::TransactionStatus), 0);
        assert!(orchestrator.resolver().tracked().is_none());
    }

    #[tokio::test]
    async fn test_connect_failure_is_pre_send() {
        let terminal = Arc::new(SimulatedTerminal::new("SALE", "POI"));
        terminal.fail_next_connects(1);
        let orchestrator = PaymentOrchestrator::direct(terminal.clone(), config());

        let outcome = orchestrator.execute_payment(request("1")).await;
        assert_eq!(outcome.outcome, Outcome::Declined);
        assert!(terminal.sent().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_send_is_declined_without_recovery() {
        let terminal = Arc::new(SimulatedTerminal::new("SALE", "POI"));
        terminal.on_payment(Step::Reject(TransportError::SendRejected("queue full".into())));
        let orchestrator = PaymentOrchestrator::direct(terminal.clone(), config());

        let outcome = orchestrator.execute_payment(request("1")).await;
        assert_eq!(outcome.outcome, Outcome::Declined);
        assert_eq!(terminal.sent_count(MessageCategory::TransactionStatus), 0);
        assert!(orchestrator.resolver().tracked().is_none());
    }

    #[tokio::test]
    async fn test_invalid_basket_never_sent() {
        let terminal = Arc::new(SimulatedTerminal::new("SALE", "POI"));
        let orchestrator = PaymentOrchestrator::direct(terminal.clone(), config());
        let mut oversized = request("1");
        oversized.add_sale_item("A", "A", Amount::new(dec!(100.00)).unwrap());

        let outcome = orchestrator.execute_payment(oversized).await;
        assert!(!outcome.is_success());
        assert!(terminal.sent().is_empty());
    }

    #[tokio::test]
    async fn test_login_round_trip() {
        let terminal = Arc::new(SimulatedTerminal::new("SALE", "POI"));
        terminal.on_login(Step::approved());
        let orchestrator = PaymentOrchestrator::notified(terminal.clone(), config());
        assert!(orchestrator.is_listening());

        let response = orchestrator
            .login(LoginRequest {
                provider_identification: "Company A".into(),
                application_name: "POS Retail".into(),
                software_version: "01.00.00".into(),
                certification_code: "cert".into(),
            })
            .await
            .unwrap();
        assert_eq!(response.response, Response::success());
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_timeout_is_an_error() {
        let terminal = Arc::new(SimulatedTerminal::new("SALE", "POI"));
        let config = config().with_login_timeout(Duration::from_secs(5));
        let orchestrator = PaymentOrchestrator::direct(terminal, config);

        let err = orchestrator
            .login(LoginRequest {
                provider_identification: "p".into(),
                application_name: "a".into(),
                software_version: "1".into(),
                certification_code: "c".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::PaymentError::TransportError(TransportError::Timeout(_))
        ));
    }
}
