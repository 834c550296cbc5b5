//! Response acquisition strategies.
//!
//! The orchestrator and the recovery resolver never read from the transport
//! themselves. They arm a [`ResponseStrategy`] with an [`Expectation`], send,
//! and then wait. [`DirectResponses`] reads the transport inline;
//! [`NotifiedResponses`] is a one-shot gate fed by a
//! [`Dispatcher`](super::dispatch::Dispatcher) listener running on another task.

use super::dispatch::log_notification;
use crate::domain::expectation::{Expectation, Match};
use crate::domain::message::Notification;
use crate::domain::ports::{NotificationHandler, ResponseStrategy, SharedTransport};
use crate::error::{TransportError, TransportResult};
use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::warn;

fn discard_stale(notification: &Notification) {
    if let Notification::Payment(r) = notification {
        warn!(
            sale_tx = %r.sale_transaction_id,
            "Unknown sale transaction id, response discarded"
        );
    }
}

fn disconnect_error(notification: &Notification) -> Option<TransportError> {
    match notification {
        Notification::Disconnected => Some(TransportError::Disconnected),
        Notification::ConnectFailed(reason) => Some(TransportError::ConnectFailed(reason.clone())),
        _ => None,
    }
}

/// Reads the transport on the caller's task until the expected message shows up.
pub struct DirectResponses {
    transport: SharedTransport,
    expectation: tokio::sync::Mutex<Option<Expectation>>,
}

impl DirectResponses {
    pub fn new(transport: SharedTransport) -> Self {
        Self {
            transport,
            expectation: tokio::sync::Mutex::new(None),
        }
    }
}

#[async_trait]
impl ResponseStrategy for DirectResponses {
    async fn expect(&self, expectation: Expectation) {
        *self.expectation.lock().await = Some(expectation);
    }

    async fn wait(&self, timeout: Duration) -> TransportResult<Notification> {
        let expectation = self
            .expectation
            .lock()
            .await
            .clone()
            .ok_or_else(|| TransportError::Protocol("no exchange armed".to_string()))?;

        let read = async {
            loop {
                let notification = self.transport.recv().await?;
                if let Some(e) = disconnect_error(&notification) {
                    log_notification(&notification);
                    return Err(e);
                }
                match expectation.evaluate(&notification) {
                    Match::Accept => return Ok(notification),
                    Match::Stale => discard_stale(&notification),
                    Match::Unrelated => log_notification(&notification),
                }
            }
        };

        tokio::time::timeout(timeout, read)
            .await
            .map_err(|_| TransportError::Timeout(timeout))?
    }
}

#[derive(Default)]
struct Gate {
    expectation: Option<Expectation>,
    signal: Option<oneshot::Sender<TransportResult<Notification>>>,
    waiter: Option<oneshot::Receiver<TransportResult<Notification>>>,
}

/// One-shot wait/signal gate fulfilled from the dispatcher's listener task.
///
/// Each [`expect`](ResponseStrategy::expect) replaces the gate, so a signal
/// from an earlier exchange can never satisfy a later one. Only the first
/// signal after arming is kept.
#[derive(Default)]
pub struct NotifiedResponses {
    gate: Mutex<Gate>,
}

impl NotifiedResponses {
    pub fn new() -> Self {
        Self::default()
    }

    fn gate(&self) -> MutexGuard<'_, Gate> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn signal(gate: &mut Gate, result: TransportResult<Notification>) {
        if let Some(tx) = gate.signal.take() {
            // The waiter may already have timed out and gone away.
            let _ = tx.send(result);
        }
    }
}

#[async_trait]
impl ResponseStrategy for NotifiedResponses {
    async fn expect(&self, expectation: Expectation) {
        let (tx, rx) = oneshot::channel();
        let mut gate = self.gate();
        gate.expectation = Some(expectation);
        gate.signal = Some(tx);
        gate.waiter = Some(rx);
    }

    async fn wait(&self, timeout: Duration) -> TransportResult<Notification> {
        let waiter = self
            .gate()
            .waiter
            .take()
            .ok_or_else(|| TransportError::Protocol("no exchange armed".to_string()))?;

        match tokio::time::timeout(timeout, waiter).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(TransportError::Protocol(
                "exchange was re-armed while waiting".to_string(),
            )),
            Err(_) => Err(TransportError::Timeout(timeout)),
        }
    }
}

impl NotificationHandler for NotifiedResponses {
    fn handle(&self, notification: &Notification) {
        let mut gate = self.gate();
        if gate.signal.is_none() {
            return;
        }
        if let Some(e) = disconnect_error(notification) {
            Self::signal(&mut gate, Err(e));
            return;
        }
        let verdict = match &gate.expectation {
            Some(expectation) => expectation.evaluate(notification),
            None => Match::Unrelated,
        };
        match verdict {
            Match::Accept => Self::signal(&mut gate, Ok(notification.clone())),
            Match::Stale => discard_stale(notification),
            Match::Unrelated => {}
        }
    }

    fn transport_error(&self, error: &TransportError) {
        Self::signal(&mut self.gate(), Err(error.clone()));
    }
}
