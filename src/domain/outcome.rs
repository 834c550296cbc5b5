use super::message::{ErrorCondition, PaymentResponse, Response, ResultCode};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Approved,
    Declined,
    /// Still in progress when the recovery budget ran out.
    Undetermined,
}

/// The definitive result of one payment attempt.
///
/// Carries the raw diagnostic fields reported by the terminal so a
/// presentation layer can render them; nothing here is formatted for a
/// cashier.
#[derive(Debug, Serialize, PartialEq, Eq, Clone)]
pub struct PaymentOutcome {
    pub outcome: Outcome,
    pub result: Option<ResultCode>,
    pub error_condition: Option<ErrorCondition>,
    pub additional_response: Option<String>,
    pub sale_receipt: Option<String>,
}

impl PaymentOutcome {
    fn bare(outcome: Outcome) -> Self {
        Self {
            outcome,
            result: None,
            error_condition: None,
            additional_response: None,
            sale_receipt: None,
        }
    }

    /// Maps a terminal response block onto an outcome.
    pub fn from_response(response: &Response) -> Self {
        Self {
            outcome: if response.is_approved() {
                Outcome::Approved
            } else {
                Outcome::Declined
            },
            result: Some(response.result),
            error_condition: response.error_condition,
            additional_response: response.additional_response.clone(),
            sale_receipt: None,
        }
    }

    pub fn from_payment(payment: &PaymentResponse) -> Self {
        Self {
            sale_receipt: payment.sale_receipt.clone(),
            ..Self::from_response(&payment.response)
        }
    }

    /// Keeps the diagnostics of `response` but never reads it as an approval.
    pub fn declined(response: &Response) -> Self {
        Self {
            outcome: Outcome::Declined,
            ..Self::from_response(response)
        }
    }

    /// A failure that never reached the terminal, or whose cause is local.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            additional_response: Some(reason.into()),
            ..Self::bare(Outcome::Declined)
        }
    }

    pub fn undetermined(last: Option<&Response>) -> Self {
        match last {
            Some(response) => Self {
                outcome: Outcome::Undetermined,
                ..Self::from_response(response)
            },
            None => Self::bare(Outcome::Undetermined),
        }
    }

    /// Boolean view: only an approval is a success.
    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Approved
    }
}

impl fmt::Display for PaymentOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.outcome)?;
        if let Some(result) = self.result {
            write!(f, ", result={:?}", result)?;
        }
        if let Some(condition) = self.error_condition {
            write!(f, ", error_condition={:?}", condition)?;
        }
        if let Some(text) = &self.additional_response {
            write!(f, ", additional_response={}", text)?;
        }
        Ok(())
    }
}

/// What the recovery resolver reports back.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Resolution {
    /// No transmitted payment was being tracked, so nothing can have failed.
    NothingOutstanding,
    Resolved(PaymentOutcome),
}

impl Resolution {
    pub fn is_success(&self) -> bool {
        match self {
            Resolution::NothingOutstanding => true,
            Resolution::Resolved(outcome) => outcome.is_success(),
        }
    }

    pub fn outcome(&self) -> Option<&PaymentOutcome> {
        match self {
            Resolution::NothingOutstanding => None,
            Resolution::Resolved(outcome) => Some(outcome),
        }
    }
}
