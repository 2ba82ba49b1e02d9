//! # Validation Module
//!
//! Field decoding and validation for report rows.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Report decoding (caller)                                     │
//! │  └── CSV / JSON rows keyed by report label                             │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: rows module (serde)                                          │
//! │  └── Labels mapped onto typed row structs, every field a string        │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: THIS MODULE                                                  │
//! │  ├── Required fields present                                           │
//! │  ├── Amounts parse as currency, dates in a known format                │
//! │  └── Quantities within range                                           │
//! │                                                                         │
//! │  A failure names the report label that could not be decoded            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use tagger_core::validation::{parse_money_field, parse_quantity};
//!
//! let subtotal = parse_money_field("Item Subtotal", "$10.90").unwrap();
//! assert_eq!(subtotal.micros(), 10_900_000);
//! assert!(parse_quantity("Quantity", "-1").is_err());
//! ```

use chrono::NaiveDate;

use crate::error::ValidationError;
use crate::money::Money;
use crate::MAX_ITEM_QUANTITY;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

const ISO_DATE: &str = "%Y-%m-%d";
const US_DATE_LONG_YEAR: &str = "%m/%d/%Y";
const US_DATE_SHORT_YEAR: &str = "%m/%d/%y";

// =============================================================================
// String Validators
// =============================================================================

/// Returns the trimmed value, or `Required` when it is blank.
pub fn require<'a>(field: &str, value: &'a str) -> ValidationResult<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    Ok(value)
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Parses a currency field, tagging failures with the field label.
pub fn parse_money_field(field: &str, value: &str) -> ValidationResult<Money> {
    Money::parse(value).map_err(|_| ValidationError::InvalidFormat {
        field: field.to_string(),
        reason: format!("'{}' is not a currency amount", value.trim()),
    })
}

/// Parses an item quantity.
///
/// ## Rules
/// - Must be an integer
/// - Zero is allowed (such items are dropped before association)
/// - Must not exceed MAX_ITEM_QUANTITY
pub fn parse_quantity(field: &str, value: &str) -> ValidationResult<u32> {
    let raw = require(field, value)?;
    let qty: i64 = raw.parse().map_err(|_| ValidationError::InvalidFormat {
        field: field.to_string(),
        reason: format!("'{}' is not a whole number", raw),
    })?;

    if !(0..=MAX_ITEM_QUANTITY).contains(&qty) {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: MAX_ITEM_QUANTITY,
        });
    }

    // Bounded above, so the cast cannot truncate.
    Ok(qty as u32)
}

/// Parses an optional numeric catalog code. Blank means unknown.
pub fn parse_category_code(field: &str, value: &str) -> ValidationResult<Option<u64>> {
    let raw = value.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse::<u64>()
        .map(Some)
        .map_err(|_| ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: format!("'{}' is not a numeric catalog code", raw),
        })
}

// =============================================================================
// Date Validators
// =============================================================================

/// Parses a merchant report date (`MM/DD/YYYY`, `MM/DD/YY` or ISO).
///
/// Blank dates are `None`: unshipped items carry no shipment date.
pub fn parse_merchant_date(field: &str, value: &str) -> ValidationResult<Option<NaiveDate>> {
    let raw = value.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    parse_date(field, raw).map(Some)
}

/// Parses a ledger posting date (ISO, `MM/DD/YYYY` or `MM/DD/YY`).
pub fn parse_ledger_date(field: &str, value: &str) -> ValidationResult<NaiveDate> {
    parse_date(field, require(field, value)?)
}

fn parse_date(field: &str, raw: &str) -> ValidationResult<NaiveDate> {
    let format = match raw.rsplit_once('/') {
        Some((_, year)) if year.len() <= 2 => US_DATE_SHORT_YEAR,
        Some(_) => US_DATE_LONG_YEAR,
        None => ISO_DATE,
    };

    NaiveDate::parse_from_str(raw, format).map_err(|_| ValidationError::InvalidFormat {
        field: field.to_string(),
        reason: format!("'{}' is not a date (expected MM/DD/YYYY or YYYY-MM-DD)", raw),
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_require() {
        assert_eq!(require("Order ID", " 123-456 ").unwrap(), "123-456");
        assert!(require("Order ID", "").is_err());
        assert!(require("Order ID", "   ").is_err());
    }

    #[test]
    fn test_parse_money_field() {
        assert_eq!(
            parse_money_field("Total Charged", "$1,011.95").unwrap(),
            Money::from_cents(101_195)
        );
        let err = parse_money_field("Total Charged", "n/a").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Total Charged has invalid format: 'n/a' is not a currency amount"
        );
    }

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("Quantity", "0").unwrap(), 0);
        assert_eq!(parse_quantity("Quantity", "3").unwrap(), 3);
        assert_eq!(parse_quantity("Quantity", "999").unwrap(), 999);

        assert!(parse_quantity("Quantity", "").is_err());
        assert!(parse_quantity("Quantity", "-1").is_err());
        assert!(parse_quantity("Quantity", "1000").is_err());
        assert!(parse_quantity("Quantity", "two").is_err());
    }

    #[test]
    fn test_parse_category_code() {
        assert_eq!(parse_category_code("UNSPSC Code", "").unwrap(), None);
        assert_eq!(
            parse_category_code("UNSPSC Code", "43211617").unwrap(),
            Some(43_211_617)
        );
        assert!(parse_category_code("UNSPSC Code", "abc").is_err());
    }

    #[test]
    fn test_parse_merchant_date() {
        assert_eq!(
            parse_merchant_date("Order Date", "10/13/2021").unwrap(),
            Some(date(2021, 10, 13))
        );
        assert_eq!(
            parse_merchant_date("Order Date", "1/3/21").unwrap(),
            Some(date(2021, 1, 3))
        );
        assert_eq!(
            parse_merchant_date("Order Date", "2021-10-13").unwrap(),
            Some(date(2021, 10, 13))
        );
        assert_eq!(parse_merchant_date("Shipment Date", "").unwrap(), None);
        assert!(parse_merchant_date("Order Date", "13/45/2021").is_err());
    }

    #[test]
    fn test_parse_ledger_date() {
        assert_eq!(
            parse_ledger_date("date", "2014-02-28").unwrap(),
            date(2014, 2, 28)
        );
        assert_eq!(parse_ledger_date("date", "02/28/14").unwrap(), date(2014, 2, 28));
        assert!(parse_ledger_date("date", "").is_err());
        assert!(parse_ledger_date("date", "Feb 28").is_err());
    }
}
