use super::message::{Notification, TransactionId};

/// What the driving flow is currently waiting for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expectation {
    Login,
    /// The direct response to the payment with this sale transaction id.
    Payment(TransactionId),
    TransactionStatus,
}

/// How a delivered notification relates to the current expectation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Match {
    Accept,
    /// Right message type, but it answers a different request.
    Stale,
    Unrelated,
}

impl Expectation {
    pub fn evaluate(&self, notification: &Notification) -> Match {
        match (self, notification) {
            (Expectation::Login, Notification::Login(_)) => Match::Accept,
            (Expectation::Payment(id), Notification::Payment(r)) => {
                if &r.sale_transaction_id == id {
                    Match::Accept
                } else {
                    Match::Stale
                }
            }
            (Expectation::TransactionStatus, Notification::TransactionStatus(_)) => Match::Accept,
            _ => Match::Unrelated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::message::{
        LoginResponse, PaymentResponse, Response, TransactionStatusResponse,
    };

    fn payment(id: &str) -> Notification {
        Notification::Payment(PaymentResponse {
            sale_transaction_id: TransactionId::new(id),
            response: Response::success(),
            sale_receipt: None,
        })
    }

    #[test]
    fn test_payment_correlated_by_transaction_id() {
        let expectation = Expectation::Payment(TransactionId::new("A"));
        assert_eq!(expectation.evaluate(&payment("A")), Match::Accept);
        assert_eq!(expectation.evaluate(&payment("B")), Match::Stale);
    }

    #[test]
    fn test_other_messages_are_unrelated() {
        let expectation = Expectation::Payment(TransactionId::new("A"));
        let login = Notification::Login(LoginResponse {
            response: Response::success(),
        });
        assert_eq!(expectation.evaluate(&login), Match::Unrelated);
        assert_eq!(expectation.evaluate(&Notification::Connected), Match::Unrelated);
        assert_eq!(Expectation::Login.evaluate(&login), Match::Accept);

        let status = Notification::TransactionStatus(TransactionStatusResponse::in_progress());
        assert_eq!(expectation.evaluate(&status), Match::Unrelated);
        assert_eq!(Expectation::TransactionStatus.evaluate(&status), Match::Accept);
    }
}
