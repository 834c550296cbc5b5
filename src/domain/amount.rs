use crate::error::PaymentError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Add;

/// A strictly positive monetary amount.
///
/// Wraps `rust_decimal::Decimal` so that requested amounts and line-item
/// prices can never be zero or negative once constructed.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, PaymentError> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(PaymentError::ValidationError(
                "Amount must be positive".to_string(),
            ))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Extends a unit price by a quantity.
    pub fn times(self, quantity: u32) -> Result<Self, PaymentError> {
        Self::new(self.0 * Decimal::from(quantity))
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = PaymentError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl Add for Amount {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_amount_validation() {
        assert!(Amount::new(dec!(42.00)).is_ok());
        assert!(matches!(
            Amount::new(dec!(0.0)),
            Err(PaymentError::ValidationError(_))
        ));
        assert!(matches!(
            Amount::new(dec!(-1.0)),
            Err(PaymentError::ValidationError(_))
        ));
    }

    #[test]
    fn test_amount_arithmetic() {
        let a = Amount::new(dec!(10.5)).unwrap();
        let b = Amount::new(dec!(2)).unwrap();
        assert_eq!((a + b).value(), dec!(12.5));
        assert_eq!(a.times(3).unwrap().value(), dec!(31.5));
        assert!(a.times(0).is_err());
    }

    #[test]
    fn test_amount_display_two_places() {
        let a = Amount::new(dec!(42)).unwrap();
        assert_eq!(a.to_string(), "42.00");
    }

    #[test]
    fn test_amount_deserialization_rejects_non_positive() {
        let ok: Amount = serde_json::from_str("\"3.25\"").unwrap();
        assert_eq!(ok.value(), dec!(3.25));
        assert!(serde_json::from_str::<Amount>("\"0\"").is_err());
    }
}
