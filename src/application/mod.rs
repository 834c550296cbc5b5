//! Application layer: payment submission and outcome recovery.
//!
//! [`orchestrator::PaymentOrchestrator`] is the entry point. It submits one
//! payment at a time and hands ambiguous exchanges to the
//! [`recovery::RecoveryResolver`]. Both talk to the terminal through a
//! [`ResponseStrategy`](crate::domain::ports::ResponseStrategy), either read
//! inline or fed by a [`dispatch::Dispatcher`] listener.

pub mod dispatch;
pub mod orchestrator;
pub mod recovery;
pub mod responses;
