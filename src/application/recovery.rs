use crate::config::ReconcileConfig;
use crate::domain::expectation::Expectation;
use crate::domain::message::{
    Notification, OutboundMessage, ResultCode, TransactionReference, TransactionStatusRequest,
    TransactionStatusResponse,
};
use crate::domain::outcome::{PaymentOutcome, Resolution};
use crate::domain::ports::{SharedStrategy, SharedTransport};
use crate::error::{TransportError, TransportResult};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{info, warn};

/// What one processed status response means for the loop.
#[derive(Debug, PartialEq, Eq)]
pub enum Verdict {
    Terminal(PaymentOutcome),
    InProgress,
}

/// State of a single recovery cycle.
#[derive(Debug)]
pub struct RecoverySession {
    reference: TransactionReference,
    deadline: Instant,
    attempts: u32,
    last_status: Option<TransactionStatusResponse>,
}

impl RecoverySession {
    /// Starts the budget clock.
    pub fn open(reference: TransactionReference, budget: Duration) -> Self {
        Self {
            reference,
            deadline: Instant::now() + budget,
            attempts: 0,
            last_status: None,
        }
    }

    pub fn reference(&self) -> &TransactionReference {
        &self.reference
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn last_status(&self) -> Option<&TransactionStatusResponse> {
        self.last_status.as_ref()
    }

    pub fn expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// Classifies a status response.
    ///
    /// A successful query carrying the repeated payment is terminal with that
    /// payment's result. "In progress" keeps polling until the deadline. Any
    /// other answer declines.
    pub fn observe(&mut self, status: TransactionStatusResponse) -> Verdict {
        let verdict = if status.response.result == ResultCode::Success {
            match &status.repeated_payment {
                Some(payment) => Verdict::Terminal(PaymentOutcome::from_payment(payment)),
                None => Verdict::Terminal(PaymentOutcome::failed(
                    "transaction status reported success without a payment response",
                )),
            }
        } else if status.response.is_in_progress() {
            if self.expired() {
                Verdict::Terminal(PaymentOutcome::undetermined(Some(&status.response)))
            } else {
                Verdict::InProgress
            }
        } else {
            Verdict::Terminal(PaymentOutcome::declined(&status.response))
        };
        self.last_status = Some(status);
        verdict
    }

    fn give_up(&self) -> PaymentOutcome {
        PaymentOutcome::undetermined(self.last_status.as_ref().map(|s| &s.response))
    }
}

#[derive(Default)]
struct ResolverState {
    reference: Option<TransactionReference>,
    active: Option<watch::Receiver<Option<PaymentOutcome>>>,
    settled: Option<(TransactionReference, PaymentOutcome)>,
}

enum Start {
    NothingOutstanding,
    Join(watch::Receiver<Option<PaymentOutcome>>),
    Run(TransactionReference, watch::Sender<Option<PaymentOutcome>>),
}

/// Clears the tracked reference and the re-entrancy flag however the cycle ends.
struct CycleGuard<'a> {
    state: &'a Mutex<ResolverState>,
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.reference = None;
        state.active = None;
    }
}

/// Determines the outcome of a transmitted payment whose direct response was lost.
///
/// Holds at most one [`TransactionReference`] at a time. [`resolve`](Self::resolve)
/// polls the terminal with transaction status queries until the payment is
/// found, refused, or the budget runs out. A second `resolve` racing an active
/// cycle joins it instead of starting another.
pub struct RecoveryResolver {
    transport: SharedTransport,
    responses: SharedStrategy,
    poll_interval: Duration,
    budget: Duration,
    attempt_timeout: Duration,
    state: Mutex<ResolverState>,
}

impl RecoveryResolver {
    pub fn new(
        transport: SharedTransport,
        responses: SharedStrategy,
        config: &ReconcileConfig,
    ) -> Self {
        Self {
            transport,
            responses,
            poll_interval: config.poll_interval,
            budget: config.budget,
            attempt_timeout: config.attempt_timeout,
            state: Mutex::new(ResolverState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, ResolverState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Records the reference of a payment that has left the process.
    pub fn track(&self, reference: TransactionReference) {
        self.state().reference = Some(reference);
    }

    /// Forgets the tracked payment once its direct response arrived.
    /// Has no effect while a cycle is running.
    pub fn release(&self) {
        let mut state = self.state();
        if state.active.is_none() {
            state.reference = None;
        }
    }

    pub fn tracked(&self) -> Option<TransactionReference> {
        self.state().reference.clone()
    }

    pub fn is_active(&self) -> bool {
        self.state().active.is_some()
    }

    /// The outcome of the most recent completed cycle, if it was for `reference`.
    pub fn settled(&self, reference: &TransactionReference) -> Option<PaymentOutcome> {
        match &self.state().settled {
            Some((settled, outcome)) if settled == reference => Some(outcome.clone()),
            _ => None,
        }
    }

    /// Resolves the tracked payment.
    ///
    /// `initial_delay` is slept once before the first query, giving a dropped
    /// connection time to come back.
    pub async fn resolve(&self, initial_delay: Option<Duration>) -> Resolution {
        let start = {
            let mut state = self.state();
            match (state.active.clone(), state.reference.clone()) {
                (Some(active), _) => Start::Join(active),
                (None, None) => Start::NothingOutstanding,
                (None, Some(reference)) => {
                    let (publish, active) = watch::channel(None);
                    state.active = Some(active);
                    Start::Run(reference, publish)
                }
            }
        };

        let (reference, publish) = match start {
            Start::NothingOutstanding => return Resolution::NothingOutstanding,
            Start::Join(active) => {
                info!("Recovery already in progress, joining it");
                return Self::join(active).await;
            }
            Start::Run(reference, publish) => (reference, publish),
        };

        let guard = CycleGuard { state: &self.state };
        let outcome = self.run(reference.clone(), initial_delay).await;
        self.state().settled = Some((reference, outcome.clone()));
        drop(guard);

        publish.send_replace(Some(outcome.clone()));
        Resolution::Resolved(outcome)
    }

    async fn join(mut active: watch::Receiver<Option<PaymentOutcome>>) -> Resolution {
        let outcome = match active.wait_for(Option::is_some).await {
            Ok(current) => current.clone(),
            // The owning cycle was dropped before finishing.
            Err(_) => None,
        };
        Resolution::Resolved(outcome.unwrap_or_else(|| PaymentOutcome::undetermined(None)))
    }

    async fn run(
        &self,
        reference: TransactionReference,
        initial_delay: Option<Duration>,
    ) -> PaymentOutcome {
        info!(%reference, "Error recovery...");
        if let Some(delay) = initial_delay {
            tokio::time::sleep(delay).await;
        }

        let mut session = RecoverySession::open(reference, self.budget);
        let started = Instant::now();
        loop {
            session.attempts += 1;
            match self.query(session.reference()).await {
                Ok(status) => match session.observe(status) {
                    Verdict::Terminal(outcome) => {
                        info!(
                            attempt = session.attempts(),
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            %outcome,
                            "Payment result"
                        );
                        return outcome;
                    }
                    Verdict::InProgress => {
                        info!(attempt = session.attempts(), "Payment in progress...");
                    }
                },
                Err(TransportError::Timeout(_)) => {
                    warn!(attempt = session.attempts(), "Timeout waiting for result...");
                }
                Err(e) => {
                    warn!(attempt = session.attempts(), error = %e, "Waiting for connection...");
                }
            }

            if session.expired() {
                warn!(
                    attempts = session.attempts(),
                    budget_ms = self.budget.as_millis() as u64,
                    "Recovery budget exhausted, outcome undetermined"
                );
                return session.give_up();
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn query(&self, reference: &TransactionReference) -> TransportResult<TransactionStatusResponse> {
        self.transport.connect().await?;
        self.responses.expect(Expectation::TransactionStatus).await;
        self.transport
            .send(OutboundMessage::TransactionStatus(
                TransactionStatusRequest::from(reference),
            ))
            .await?;
        match self.responses.wait(self.attempt_timeout).await? {
            Notification::TransactionStatus(status) => Ok(status),
            other => Err(TransportError::Protocol(format!(
                "unexpected reply to status query: {:?}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::message::{
        ErrorCondition, MessageCategory, MessageHeader, PaymentResponse, Response, TransactionId,
    };
    use crate::domain::outcome::Outcome;

    fn reference() -> TransactionReference {
        TransactionReference::from(&MessageHeader {
            category: MessageCategory::Payment,
            sale_id: "SALE".into(),
            poi_id: "POI".into(),
            service_id: "1".into(),
        })
    }

    fn found(response: Response) -> TransactionStatusResponse {
        TransactionStatusResponse::found(PaymentResponse {
            sale_transaction_id: TransactionId::new("t"),
            response,
            sale_receipt: None,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_observe_found_is_terminal() {
        let mut session = RecoverySession::open(reference(), Duration::from_secs(60));
        assert_eq!(
            session.observe(found(Response::success())),
            Verdict::Terminal(PaymentOutcome::from_response(&Response::success()))
        );
        let declined = Response::failure(ErrorCondition::Refusal, "refused");
        match session.observe(found(declined)) {
            Verdict::Terminal(outcome) => assert_eq!(outcome.outcome, Outcome::Declined),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_observe_in_progress_until_deadline() {
        let mut session = RecoverySession::open(reference(), Duration::from_secs(60));
        assert_eq!(
            session.observe(TransactionStatusResponse::in_progress()),
            Verdict::InProgress
        );
        tokio::time::advance(Duration::from_secs(60)).await;
        match session.observe(TransactionStatusResponse::in_progress()) {
            Verdict::Terminal(outcome) => {
                assert_eq!(outcome.outcome, Outcome::Undetermined);
                assert!(!outcome.is_success());
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(session.last_status().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_observe_explicit_failure_declines() {
        let mut session = RecoverySession::open(reference(), Duration::from_secs(60));
        let verdict = session.observe(TransactionStatusResponse::failed(
            ErrorCondition::NotFound,
            "no such transaction",
        ));
        match verdict {
            Verdict::Terminal(outcome) => {
                assert_eq!(outcome.outcome, Outcome::Declined);
                assert_eq!(outcome.error_condition, Some(ErrorCondition::NotFound));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_observe_partial_status_is_not_an_approval() {
        let mut session = RecoverySession::open(reference(), Duration::from_secs(60));
        let status = TransactionStatusResponse {
            response: Response {
                result: ResultCode::Partial,
                error_condition: None,
                additional_response: None,
            },
            repeated_payment: None,
        };
        match session.observe(status) {
            Verdict::Terminal(outcome) => assert_eq!(outcome.outcome, Outcome::Declined),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_without_payment_declines() {
        let mut session = RecoverySession::open(reference(), Duration::from_secs(60));
        let status = TransactionStatusResponse {
            response: Response::success(),
            repeated_payment: None,
        };
        assert!(matches!(
            session.observe(status),
            Verdict::Terminal(PaymentOutcome {
                outcome: Outcome::Declined,
                ..
            })
        ));
    }
}
