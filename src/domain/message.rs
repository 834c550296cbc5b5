use super::amount::Amount;
use crate::error::PaymentError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MessageCategory {
    Login,
    Payment,
    TransactionStatus,
    Display,
}

/// Addressing information stamped on every message the transport sends.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct MessageHeader {
    pub category: MessageCategory,
    pub sale_id: String,
    pub poi_id: String,
    pub service_id: String,
}

/// Identifies a previously transmitted request so its status can be queried.
///
/// Captured from the header the transport returned when the request left the
/// process. Read-only once captured.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Hash)]
pub struct TransactionReference {
    category: MessageCategory,
    sale_id: String,
    poi_id: String,
    service_id: String,
}

impl TransactionReference {
    pub fn category(&self) -> MessageCategory {
        self.category
    }

    pub fn sale_id(&self) -> &str {
        &self.sale_id
    }

    pub fn poi_id(&self) -> &str {
        &self.poi_id
    }

    pub fn service_id(&self) -> &str {
        &self.service_id
    }
}

impl From<&MessageHeader> for TransactionReference {
    fn from(header: &MessageHeader) -> Self {
        Self {
            category: header.category,
            sale_id: header.sale_id.clone(),
            poi_id: header.poi_id.clone(),
            service_id: header.service_id.clone(),
        }
    }
}

impl fmt::Display for TransactionReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?}/{}/{}/{}",
            self.category, self.sale_id, self.poi_id, self.service_id
        )
    }
}

/// The sale system's identifier for a purchase.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Hash)]
#[serde(transparent)]
pub struct TransactionId(String);

impl TransactionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derives an id from a UTC timestamp with sub-millisecond resolution.
    pub fn from_timestamp(at: DateTime<Utc>) -> Self {
        Self(at.format("%Y%m%d%H%M%S%f").to_string()[..18].to_string())
    }

    pub fn now() -> Self {
        Self::from_timestamp(Utc::now())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
pub enum ResultCode {
    Success,
    Partial,
    Failure,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
pub enum ErrorCondition {
    Aborted,
    Busy,
    Cancel,
    DeviceOut,
    InProgress,
    InsertedCard,
    InvalidCard,
    LoggedOut,
    MessageFormat,
    NotAllowed,
    NotFound,
    PaymentRestriction,
    Refusal,
    UnavailableDevice,
    UnavailableService,
    UnreachableHost,
    WrongPin,
}

/// The result block every terminal response carries.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct Response {
    pub result: ResultCode,
    pub error_condition: Option<ErrorCondition>,
    pub additional_response: Option<String>,
}

impl Response {
    pub fn success() -> Self {
        Self {
            result: ResultCode::Success,
            error_condition: None,
            additional_response: None,
        }
    }

    pub fn failure(condition: ErrorCondition, additional_response: impl Into<String>) -> Self {
        Self {
            result: ResultCode::Failure,
            error_condition: Some(condition),
            additional_response: Some(additional_response.into()),
        }
    }

    pub fn in_progress() -> Self {
        Self {
            result: ResultCode::Failure,
            error_condition: Some(ErrorCondition::InProgress),
            additional_response: None,
        }
    }

    /// Partial approvals count as approved.
    pub fn is_approved(&self) -> bool {
        matches!(self.result, ResultCode::Success | ResultCode::Partial)
    }

    pub fn is_in_progress(&self) -> bool {
        self.error_condition == Some(ErrorCondition::InProgress)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct SaleItem {
    pub item_id: u32,
    pub product_code: String,
    pub product_label: String,
    pub quantity: u32,
    pub unit_price: Amount,
    pub item_amount: Amount,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct PaymentRequest {
    pub sale_transaction_id: TransactionId,
    pub requested_amount: Amount,
    pub sale_items: Vec<SaleItem>,
}

impl PaymentRequest {
    pub fn new(sale_transaction_id: TransactionId, requested_amount: Amount) -> Self {
        Self {
            sale_transaction_id,
            requested_amount,
            sale_items: Vec::new(),
        }
    }

    /// Appends a single-unit line item priced at `item_amount`.
    pub fn add_sale_item(
        &mut self,
        product_code: impl Into<String>,
        product_label: impl Into<String>,
        item_amount: Amount,
    ) {
        let item_id = self.sale_items.len() as u32 + 1;
        self.sale_items.push(SaleItem {
            item_id,
            product_code: product_code.into(),
            product_label: product_label.into(),
            quantity: 1,
            unit_price: item_amount,
            item_amount,
        });
    }

    /// Replaces the line items, renumbering them from 1.
    pub fn with_sale_items(mut self, items: Vec<SaleItem>) -> Self {
        self.sale_items = items
            .into_iter()
            .enumerate()
            .map(|(i, item)| SaleItem {
                item_id: i as u32 + 1,
                ..item
            })
            .collect();
        self
    }

    /// Checks that the basket does not exceed the requested amount.
    pub fn validate(&self) -> Result<(), PaymentError> {
        let basket = self.sale_items.iter().map(|i| i.item_amount).reduce(|a, b| a + b);
        match basket {
            Some(total) if total > self.requested_amount => Err(PaymentError::ValidationError(
                format!(
                    "Sale items total {} exceeds requested amount {}",
                    total, self.requested_amount
                ),
            )),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct PaymentResponse {
    pub sale_transaction_id: TransactionId,
    pub response: Response,
    /// Plain-text sale receipt, already rendered by the terminal.
    pub sale_receipt: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct TransactionStatusRequest {
    pub message_reference: TransactionReference,
}

impl From<&TransactionReference> for TransactionStatusRequest {
    fn from(reference: &TransactionReference) -> Self {
        Self {
            message_reference: reference.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct TransactionStatusResponse {
    pub response: Response,
    /// The repeated payment response, present when the status query succeeded.
    pub repeated_payment: Option<PaymentResponse>,
}

impl TransactionStatusResponse {
    pub fn found(payment: PaymentResponse) -> Self {
        Self {
            response: Response::success(),
            repeated_payment: Some(payment),
        }
    }

    pub fn in_progress() -> Self {
        Self {
            response: Response::in_progress(),
            repeated_payment: None,
        }
    }

    pub fn failed(condition: ErrorCondition, text: impl Into<String>) -> Self {
        Self {
            response: Response::failure(condition, text),
            repeated_payment: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct LoginRequest {
    pub provider_identification: String,
    pub application_name: String,
    pub software_version: String,
    pub certification_code: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct LoginResponse {
    pub response: Response,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Default)]
pub struct DisplayRequest {
    pub cashier_text: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
pub enum LogLevel {
    Trace,
    Debug,
    Information,
    Warning,
    Error,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct LogEvent {
    pub level: LogLevel,
    pub data: String,
}

/// Requests the sale system sends to the terminal.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub enum OutboundMessage {
    Login(LoginRequest),
    Payment(PaymentRequest),
    TransactionStatus(TransactionStatusRequest),
}

impl OutboundMessage {
    pub fn category(&self) -> MessageCategory {
        match self {
            OutboundMessage::Login(_) => MessageCategory::Login,
            OutboundMessage::Payment(_) => MessageCategory::Payment,
            OutboundMessage::TransactionStatus(_) => MessageCategory::TransactionStatus,
        }
    }
}

/// Everything the transport can deliver back to the sale system.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub enum Notification {
    Connected,
    ConnectFailed(String),
    Disconnected,
    Login(LoginResponse),
    Payment(PaymentResponse),
    TransactionStatus(TransactionStatusResponse),
    Display(DisplayRequest),
    Log(LogEvent),
}
