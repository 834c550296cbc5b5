//! Domain model for payment reconciliation: messages exchanged with the
//! terminal, outcome types, and the ports the application layer depends on.

pub mod amount;
pub mod expectation;
pub mod message;
pub mod outcome;
pub mod ports;
