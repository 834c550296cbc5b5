use crate::domain::amount::Amount;
use crate::domain::message::SaleItem;
use crate::error::{PaymentError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize)]
struct SaleItemRecord {
    product_code: String,
    product_label: String,
    quantity: Option<u32>,
    unit_price: Decimal,
}

impl TryFrom<SaleItemRecord> for SaleItem {
    type Error = PaymentError;

    fn try_from(record: SaleItemRecord) -> Result<Self> {
        let quantity = record.quantity.unwrap_or(1);
        if quantity == 0 {
            return Err(PaymentError::ValidationError(format!(
                "Quantity must be positive for {}",
                record.product_code
            )));
        }
        let unit_price = Amount::new(record.unit_price)?;
        Ok(SaleItem {
            // Numbered when attached to a request.
            item_id: 0,
            product_code: record.product_code,
            product_label: record.product_label,
            quantity,
            unit_price,
            item_amount: unit_price.times(quantity)?,
        })
    }
}

/// Reads a shopping basket from a CSV source.
///
/// Expects the columns `product_code, product_label, quantity, unit_price`;
/// `quantity` may be left empty and defaults to one.
pub struct SaleItemReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> SaleItemReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily yields one line item per row.
    pub fn items(self) -> impl Iterator<Item = Result<SaleItem>> {
        self.reader
            .into_deserialize::<SaleItemRecord>()
            .map(|result| result.map_err(PaymentError::from).and_then(SaleItem::try_from))
    }

    /// Reads the whole basket, failing on the first bad row.
    pub fn read_all(self) -> Result<Vec<SaleItem>> {
        self.items().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_reader_computes_item_amount() {
        let data = "product_code, product_label, quantity, unit_price\n\
                    XXYYZZ123, Name of product, 2, 20.00\n\
                    BAG, Bag, , 2.00";
        let items = SaleItemReader::new(data.as_bytes()).read_all().unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].product_label, "Name of product");
        assert_eq!(items[0].item_amount.value(), dec!(40.00));
        assert_eq!(items[1].quantity, 1);
        assert_eq!(items[1].item_amount.value(), dec!(2.00));
    }

    #[test]
    fn test_reader_rejects_non_positive_price() {
        let data = "product_code, product_label, quantity, unit_price\nA, Free, 1, 0";
        let results: Vec<Result<SaleItem>> = SaleItemReader::new(data.as_bytes()).items().collect();
        assert!(matches!(results[0], Err(PaymentError::ValidationError(_))));
    }

    #[test]
    fn test_reader_malformed_line() {
        let data = "product_code, product_label, quantity, unit_price\nA, A, many, 1.0";
        let results: Vec<Result<SaleItem>> = SaleItemReader::new(data.as_bytes()).items().collect();
        assert!(matches!(results[0], Err(PaymentError::CsvError(_))));
    }
}
