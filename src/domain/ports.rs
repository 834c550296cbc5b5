use super::expectation::Expectation;
use super::message::{MessageHeader, Notification, OutboundMessage};
use crate::error::{TransportError, TransportResult};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// The secure session to the payment terminal.
///
/// Implementations own connecting, logging in, and framing; the reconciliation
/// core only needs to hand requests over and read back what arrives.
#[async_trait]
pub trait TransportClient: Send + Sync {
    /// Opens the session if it is not already open.
    async fn connect(&self) -> TransportResult<()>;

    /// Hands a request to the transport and returns the header it was sent with.
    ///
    /// An `Err` means the request never left the process.
    async fn send(&self, message: OutboundMessage) -> TransportResult<MessageHeader>;

    /// Waits for the next notification from the terminal.
    async fn recv(&self) -> TransportResult<Notification>;
}

/// How the driving flow obtains the response to the request it just sent.
#[async_trait]
pub trait ResponseStrategy: Send + Sync {
    /// Resets the strategy for a new exchange. Must be called before sending.
    async fn expect(&self, expectation: Expectation);

    /// Waits for the notification satisfying the armed expectation.
    async fn wait(&self, timeout: Duration) -> TransportResult<Notification>;
}

/// A subscriber to notifications posted by a [`Dispatcher`](crate::application::dispatch::Dispatcher).
pub trait NotificationHandler: Send + Sync {
    fn handle(&self, notification: &Notification);

    /// Called when reading from the transport failed.
    fn transport_error(&self, _error: &TransportError) {}
}

pub type SharedTransport = Arc<dyn TransportClient>;
pub type SharedStrategy = Arc<dyn ResponseStrategy>;
pub type SharedHandler = Arc<dyn NotificationHandler>;
