use crate::domain::message::{LogLevel, Notification};
use crate::domain::ports::{NotificationHandler, SharedHandler, SharedTransport};
use crate::error::TransportError;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

/// Pause before reading again after a failed read.
pub const RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// Posts every notification it receives to the registered handlers, in
/// registration order.
#[derive(Default)]
pub struct Dispatcher {
    handlers: Vec<SharedHandler>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: SharedHandler) {
        self.handlers.push(handler);
    }

    pub fn dispatch(&self, notification: &Notification) {
        for handler in &self.handlers {
            handler.handle(notification);
        }
    }

    /// Reports a failed read to every handler.
    pub fn fail(&self, error: &TransportError) {
        for handler in &self.handlers {
            handler.transport_error(error);
        }
    }

    /// Spawns the background listener that drains `transport` into the handlers.
    ///
    /// Read errors are reported through [`fail`](Self::fail) and reading resumes
    /// after [`RETRY_BACKOFF`]. The listener only stops once the transport
    /// reports [`TransportError::Closed`].
    pub fn spawn_listener(self: Arc<Self>, transport: SharedTransport) -> Listener {
        let handle = tokio::spawn(async move {
            loop {
                match transport.recv().await {
                    Ok(notification) => self.dispatch(&notification),
                    Err(TransportError::Timeout(_)) => continue,
                    Err(TransportError::Closed) => {
                        error!("Transport closed, listener stopped");
                        self.fail(&TransportError::Closed);
                        break;
                    }
                    Err(e) => {
                        self.fail(&e);
                        tokio::time::sleep(RETRY_BACKOFF).await;
                    }
                }
            }
        });
        Listener { handle }
    }
}

/// Owns the listener task; dropping it stops the listener.
pub struct Listener {
    handle: JoinHandle<()>,
}

impl Listener {
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Logs terminal traffic that is not an awaited response.
pub fn log_notification(notification: &Notification) {
    match notification {
        Notification::Connected => info!("Connected to terminal"),
        Notification::ConnectFailed(reason) => warn!(%reason, "Connect error"),
        Notification::Disconnected => warn!("Disconnected from terminal"),
        Notification::Login(r) => {
            if r.response.is_approved() {
                info!(result = ?r.response.result, "Login result");
            } else {
                warn!(
                    result = ?r.response.result,
                    error_condition = ?r.response.error_condition,
                    additional_response = r.response.additional_response.as_deref().unwrap_or(""),
                    "Login result"
                );
            }
        }
        Notification::Display(d) => {
            if let Some(text) = &d.cashier_text {
                info!(cashier_display = %text, "Cashier display");
            }
        }
        Notification::Log(event) => match event.level {
            LogLevel::Trace => trace!(target: "terminal", "{}", event.data),
            LogLevel::Debug => debug!(target: "terminal", "{}", event.data),
            LogLevel::Information => info!(target: "terminal", "{}", event.data),
            LogLevel::Warning => warn!(target: "terminal", "{}", event.data),
            LogLevel::Error => error!(target: "terminal", "{}", event.data),
        },
        Notification::Payment(r) => {
            debug!(sale_tx = %r.sale_transaction_id, result = ?r.response.result, "Payment response")
        }
        Notification::TransactionStatus(r) => {
            debug!(result = ?r.response.result, "Transaction status response")
        }
    }
}

/// Handler that routes everything through [`log_notification`].
pub struct LoggingHandler;

impl NotificationHandler for LoggingHandler {
    fn handle(&self, notification: &Notification) {
        log_notification(notification);
    }

    fn transport_error(&self, error: &TransportError) {
        warn!(%error, "Waiting for connection...");
    }
}
