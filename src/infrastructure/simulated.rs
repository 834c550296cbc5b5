use crate::domain::message::{
    LoginResponse, MessageCategory, MessageHeader, Notification, OutboundMessage, PaymentRequest,
    PaymentResponse, Response, TransactionId, TransactionStatusResponse,
};
use crate::domain::ports::TransportClient;
use crate::error::{TransportError, TransportResult};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::debug;

/// How the simulated terminal reacts to the next request of a category.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Reply with this result block, shaped for the request's category.
    Answer(Response),
    /// For status queries: report the tracked payment with this result.
    /// Behaves like `Answer` for other categories.
    Found(Response),
    /// Transmit, then deliver these notifications verbatim.
    Deliver(Vec<Notification>),
    /// Transmit, then drop the connection.
    Disconnect,
    /// Transmit and never reply.
    Silence,
    /// Transmit, then fail the next read with this error.
    Fail(TransportError),
    /// Refuse the request before it is transmitted.
    Reject(TransportError),
}

impl Step {
    pub fn approved() -> Self {
        Step::Answer(Response::success())
    }

    pub fn declined(
        condition: crate::domain::message::ErrorCondition,
        text: impl Into<String>,
    ) -> Self {
        Step::Answer(Response::failure(condition, text))
    }

    pub fn in_progress() -> Self {
        Step::Answer(Response::in_progress())
    }

    pub fn found_approved() -> Self {
        Step::Found(Response::success())
    }
}

#[derive(Default)]
struct TerminalState {
    connected: bool,
    connect_failures: u32,
    next_service_id: u64,
    sent: Vec<(MessageHeader, OutboundMessage)>,
    scripts: HashMap<MessageCategory, VecDeque<Step>>,
    last_payment: Option<PaymentRequest>,
}

/// An in-process payment terminal driven by per-category scripts.
///
/// Every request pops the next [`Step`] queued for its category; an empty
/// queue means the terminal stays silent. Replies land in an internal queue
/// read by [`TransportClient::recv`], so both response strategies can be
/// exercised against it.
pub struct SimulatedTerminal {
    sale_id: String,
    poi_id: String,
    state: Mutex<TerminalState>,
    tx: Mutex<Option<mpsc::UnboundedSender<TransportResult<Notification>>>>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<TransportResult<Notification>>>,
}

impl SimulatedTerminal {
    pub fn new(sale_id: impl Into<String>, poi_id: impl Into<String>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            sale_id: sale_id.into(),
            poi_id: poi_id.into(),
            state: Mutex::new(TerminalState::default()),
            tx: Mutex::new(Some(tx)),
            rx: tokio::sync::Mutex::new(rx),
        }
    }

    fn state(&self) -> MutexGuard<'_, TerminalState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues a reaction for the next request of `category`.
    pub fn script(&self, category: MessageCategory, step: Step) -> &Self {
        self.state()
            .scripts
            .entry(category)
            .or_default()
            .push_back(step);
        self
    }

    pub fn on_login(&self, step: Step) -> &Self {
        self.script(MessageCategory::Login, step)
    }

    pub fn on_payment(&self, step: Step) -> &Self {
        self.script(MessageCategory::Payment, step)
    }

    pub fn on_status(&self, step: Step) -> &Self {
        self.script(MessageCategory::TransactionStatus, step)
    }

    /// Makes the next `count` connection attempts fail.
    pub fn fail_next_connects(&self, count: u32) -> &Self {
        self.state().connect_failures = count;
        self
    }

    fn deliver(&self, item: TransportResult<Notification>) {
        if let Some(tx) = self.tx.lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
            // The receiver lives as long as `self`.
            let _ = tx.send(item);
        }
    }

    /// Delivers an unsolicited notification.
    pub fn push(&self, notification: Notification) {
        self.deliver(Ok(notification));
    }

    /// Shuts the terminal down; reads fail with [`TransportError::Closed`]
    /// once the queued notifications are drained.
    pub fn close(&self) {
        self.tx.lock().unwrap_or_else(PoisonError::into_inner).take();
    }

    /// Requests that actually left the sale system, in order.
    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.state().sent.iter().map(|(_, m)| m.clone()).collect()
    }

    pub fn sent_headers(&self) -> Vec<MessageHeader> {
        self.state().sent.iter().map(|(h, _)| h.clone()).collect()
    }

    pub fn sent_count(&self, category: MessageCategory) -> usize {
        self.state()
            .sent
            .iter()
            .filter(|(h, _)| h.category == category)
            .count()
    }

    pub fn is_connected(&self) -> bool {
        self.state().connected
    }

    fn receipt(request: Option<&PaymentRequest>, response: &Response) -> Option<String> {
        let request = request?;
        if !response.is_approved() {
            return None;
        }
        Some(format!(
            "SALE RECEIPT\nTransaction {}\nAmount {}\nAPPROVED",
            request.sale_transaction_id, request.requested_amount
        ))
    }

    fn payment_reply(last: Option<&PaymentRequest>, response: Response) -> PaymentResponse {
        PaymentResponse {
            sale_transaction_id: last
                .map(|p| p.sale_transaction_id.clone())
                .unwrap_or_else(|| TransactionId::new("")),
            sale_receipt: Self::receipt(last, &response),
            response,
        }
    }

    fn reply(
        category: MessageCategory,
        step_found: bool,
        response: Response,
        last: Option<&PaymentRequest>,
    ) -> Notification {
        match category {
            MessageCategory::Payment => Notification::Payment(Self::payment_reply(last, response)),
            MessageCategory::TransactionStatus if step_found => Notification::TransactionStatus(
                TransactionStatusResponse::found(Self::payment_reply(last, response)),
            ),
            MessageCategory::TransactionStatus => {
                Notification::TransactionStatus(TransactionStatusResponse {
                    response,
                    repeated_payment: None,
                })
            }
            MessageCategory::Login => Notification::Login(LoginResponse { response }),
            MessageCategory::Display => Notification::Display(Default::default()),
        }
    }
}

#[async_trait]
impl TransportClient for SimulatedTerminal {
    async fn connect(&self) -> TransportResult<()> {
        let mut state = self.state();
        if state.connected {
            return Ok(());
        }
        if state.connect_failures > 0 {
            state.connect_failures -= 1;
            return Err(TransportError::ConnectFailed(
                "terminal unreachable".to_string(),
            ));
        }
        state.connected = true;
        self.push(Notification::Connected);
        Ok(())
    }

    async fn send(&self, message: OutboundMessage) -> TransportResult<MessageHeader> {
        let mut state = self.state();
        if !state.connected {
            return Err(TransportError::Disconnected);
        }

        let category = message.category();
        let step = state
            .scripts
            .get_mut(&category)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Step::Silence);
        if let Step::Reject(e) = step {
            return Err(e);
        }

        state.next_service_id += 1;
        let header = MessageHeader {
            category,
            sale_id: self.sale_id.clone(),
            poi_id: self.poi_id.clone(),
            service_id: state.next_service_id.to_string(),
        };
        if let OutboundMessage::Payment(request) = &message {
            state.last_payment = Some(request.clone());
        }
        debug!(service_id = %header.service_id, ?category, ?step, "Simulated terminal received request");
        state.sent.push((header.clone(), message));

        let last = state.last_payment.clone();
        match step {
            Step::Answer(response) => {
                self.push(Self::reply(category, false, response, last.as_ref()))
            }
            Step::Found(response) => {
                self.push(Self::reply(category, true, response, last.as_ref()))
            }
            Step::Deliver(notifications) => notifications.into_iter().for_each(|n| self.push(n)),
            Step::Disconnect => {
                state.connected = false;
                self.push(Notification::Disconnected);
            }
            Step::Fail(e) => self.deliver(Err(e)),
            Step::Silence | Step::Reject(_) => {}
        }
        Ok(header)
    }

    async fn recv(&self) -> TransportResult<Notification> {
        self.rx
            .lock()
            .await
            .recv()
            .await
            .unwrap_or(Err(TransportError::Closed))
    }
}
