//! # Report Rows
//!
//! Typed rows as they come out of the merchant reports and the ledger
//! export, before any field is parsed.
//!
//! ## Decoding Boundary
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  caller: CSV / JSON reader                                             │
//! │     │  one map per row, keyed by report label ("Item Subtotal", ...)   │
//! │     ▼                                                                   │
//! │  ItemRow / ChargeRow / RefundRow / LedgerRow   (serde, all strings)    │
//! │     │  TryFrom: money, dates, quantities parsed and validated          │
//! │     ▼                                                                   │
//! │  LineItem / Charge / Refund / LedgerTransaction                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Unknown labels are ignored and missing labels default to empty, so a
//! report that grows new columns still decodes.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

use crate::error::ValidationError;
use crate::records::{Charge, ItemStatus, LedgerTransaction, LineItem, Refund};
use crate::validation::{
    parse_category_code, parse_ledger_date, parse_merchant_date, parse_money_field,
    parse_quantity, require, ValidationResult,
};

// =============================================================================
// Merchant Rows
// =============================================================================

/// One row of the merchant items report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemRow {
    #[serde(rename = "Order ID")]
    pub order_id: String,
    #[serde(rename = "Order Date")]
    pub order_date: String,
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "ASIN/ISBN")]
    pub product_id: String,
    #[serde(rename = "UNSPSC Code")]
    pub category_code: String,
    #[serde(rename = "Quantity", deserialize_with = "string_or_number")]
    pub quantity: String,
    #[serde(rename = "Purchase Price Per Unit")]
    pub unit_price: String,
    #[serde(rename = "Item Subtotal")]
    pub subtotal: String,
    #[serde(rename = "Item Subtotal Tax")]
    pub tax: String,
    #[serde(rename = "Item Total")]
    pub total: String,
    #[serde(rename = "Carrier Name & Tracking Number")]
    pub tracking: String,
    #[serde(rename = "Shipment Date")]
    pub ship_date: String,
    #[serde(rename = "Order Status")]
    pub status: String,
    #[serde(rename = "Website")]
    pub website: String,
}

impl TryFrom<ItemRow> for LineItem {
    type Error = ValidationError;

    fn try_from(row: ItemRow) -> ValidationResult<Self> {
        Ok(LineItem {
            order_id: require("Order ID", &row.order_id)?.to_string(),
            title: row.title.trim().to_string(),
            product_id: row.product_id.trim().to_string(),
            category_code: parse_category_code("UNSPSC Code", &row.category_code)?,
            quantity: parse_quantity("Quantity", &row.quantity)?,
            unit_price: parse_money_field("Purchase Price Per Unit", &row.unit_price)?,
            subtotal: parse_money_field("Item Subtotal", &row.subtotal)?,
            tax: parse_money_field("Item Subtotal Tax", &row.tax)?,
            total: parse_money_field("Item Total", &row.total)?,
            tracking: row.tracking.trim().to_string(),
            order_date: parse_merchant_date("Order Date", &row.order_date)?,
            ship_date: parse_merchant_date("Shipment Date", &row.ship_date)?,
            status: ItemStatus::from(row.status),
            website: row.website.trim().to_string(),
        })
    }
}

/// One row of the merchant orders report: a single shipment (charge).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChargeRow {
    #[serde(rename = "Order ID")]
    pub order_id: String,
    #[serde(rename = "Order Date")]
    pub order_date: String,
    #[serde(rename = "Shipment Date")]
    pub ship_date: String,
    #[serde(rename = "Carrier Name & Tracking Number")]
    pub tracking: String,
    #[serde(rename = "Payment Instrument Type")]
    pub payment_instrument: String,
    #[serde(rename = "Website")]
    pub website: String,
    #[serde(rename = "Shipping Address Street 1")]
    pub address_street1: String,
    #[serde(rename = "Shipping Address Street 2")]
    pub address_street2: String,
    #[serde(rename = "Shipping Address City")]
    pub address_city: String,
    #[serde(rename = "Shipping Address State")]
    pub address_state: String,
    #[serde(rename = "Shipping Address Zip")]
    pub address_zip: String,
    #[serde(rename = "Subtotal")]
    pub subtotal: String,
    #[serde(rename = "Shipping Charge")]
    pub shipping: String,
    #[serde(rename = "Total Promotions")]
    pub promotions: String,
    #[serde(rename = "Tax Before Promotions")]
    pub tax_before_promotions: String,
    #[serde(rename = "Tax Charged")]
    pub tax: String,
    #[serde(rename = "Total Charged")]
    pub total: String,
}

impl ChargeRow {
    /// Address parts joined by single spaces, with surrounding spaces so a
    /// marker like `" CO "` can match the state.
    fn ship_address(&self) -> String {
        let parts = [
            &self.address_street1,
            &self.address_street2,
            &self.address_city,
            &self.address_state,
            &self.address_zip,
        ];
        let joined: Vec<&str> = parts
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .collect();
        format!(" {} ", joined.join(" "))
    }
}

impl TryFrom<ChargeRow> for Charge {
    type Error = ValidationError;

    /// The charge id is the order id; [`decode_charges`] makes it unique.
    fn try_from(row: ChargeRow) -> ValidationResult<Self> {
        let order_id = require("Order ID", &row.order_id)?.to_string();
        Ok(Charge {
            id: order_id.clone(),
            ship_address: row.ship_address(),
            order_id,
            order_date: parse_merchant_date("Order Date", &row.order_date)?,
            ship_date: parse_merchant_date("Shipment Date", &row.ship_date)?,
            tracking: row.tracking.trim().to_string(),
            payment_instrument: row.payment_instrument.trim().to_string(),
            website: row.website.trim().to_string(),
            subtotal: parse_money_field("Subtotal", &row.subtotal)?,
            shipping: parse_money_field("Shipping Charge", &row.shipping)?,
            promotions: parse_money_field("Total Promotions", &row.promotions)?,
            tax_before_promotions: parse_money_field(
                "Tax Before Promotions",
                &row.tax_before_promotions,
            )?,
            tax: parse_money_field("Tax Charged", &row.tax)?,
            total: parse_money_field("Total Charged", &row.total)?,
            delivery_fee: None,
            items: Vec::new(),
            matched_transaction: None,
        })
    }
}

/// One row of the merchant refunds report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefundRow {
    #[serde(rename = "Order ID")]
    pub order_id: String,
    #[serde(rename = "Order Date")]
    pub order_date: String,
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "ASIN/ISBN")]
    pub product_id: String,
    #[serde(rename = "Website")]
    pub website: String,
    #[serde(rename = "Refund Date")]
    pub refund_date: String,
    #[serde(rename = "Refund Amount")]
    pub amount: String,
    #[serde(rename = "Refund Tax Amount")]
    pub tax: String,
    #[serde(rename = "Refund Reason")]
    pub reason: String,
    #[serde(rename = "Quantity", deserialize_with = "string_or_number")]
    pub quantity: String,
}

impl TryFrom<RefundRow> for Refund {
    type Error = ValidationError;

    /// The refund id is the order id; [`decode_refunds`] makes it unique.
    fn try_from(row: RefundRow) -> ValidationResult<Self> {
        let order_id = require("Order ID", &row.order_id)?.to_string();
        Ok(Refund {
            id: order_id.clone(),
            order_id,
            title: row.title.trim().to_string(),
            product_id: row.product_id.trim().to_string(),
            quantity: parse_quantity("Quantity", &row.quantity)?,
            amount: parse_money_field("Refund Amount", &row.amount)?,
            tax: parse_money_field("Refund Tax Amount", &row.tax)?,
            order_date: parse_merchant_date("Order Date", &row.order_date)?,
            refund_date: parse_merchant_date("Refund Date", &row.refund_date)?,
            reason: row.reason.trim().to_string(),
            website: row.website.trim().to_string(),
            matched_transaction: None,
        })
    }
}

// =============================================================================
// Ledger Rows
// =============================================================================

/// One transaction of the ledger export.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LedgerRow {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub date: String,
    /// Original posting date.
    pub odate: String,
    /// Current description.
    pub merchant: String,
    /// Description as first imported.
    pub omerchant: String,
    /// Unsigned display amount.
    pub amount: String,
    pub is_debit: bool,
    pub category: String,
    pub note: String,
    pub is_pending: bool,
    pub is_child: bool,
    #[serde(deserialize_with = "string_or_number")]
    pub pid: String,
}

impl TryFrom<LedgerRow> for LedgerTransaction {
    type Error = ValidationError;

    fn try_from(row: LedgerRow) -> ValidationResult<Self> {
        let amount = parse_money_field("amount", &row.amount)?;
        let amount = if row.is_debit { amount.abs() } else { -amount.abs() };
        let original_date = match row.odate.trim() {
            "" => None,
            odate => Some(parse_ledger_date("odate", odate)?),
        };
        let parent_id = if row.is_child {
            Some(require("pid", &row.pid)?.to_string())
        } else {
            None
        };

        Ok(LedgerTransaction {
            id: require("id", &row.id)?.to_string(),
            date: parse_ledger_date("date", &row.date)?,
            original_date,
            description: row.merchant,
            original_description: row.omerchant,
            amount,
            category: row.category,
            note: row.note,
            is_pending: row.is_pending,
            parent_id,
            children: Vec::new(),
            matched: None,
        })
    }
}

/// Accepts `"123"` or `123` for id-like and quantity fields.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    })
}

// =============================================================================
// Batch Decoding
// =============================================================================

pub fn decode_items(rows: Vec<ItemRow>) -> ValidationResult<Vec<LineItem>> {
    rows.into_iter().map(LineItem::try_from).collect()
}

/// Decodes charges and numbers them per order: `"{order_id}-1"`, ...
pub fn decode_charges(rows: Vec<ChargeRow>) -> ValidationResult<Vec<Charge>> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    rows.into_iter()
        .map(|row| {
            let mut charge = Charge::try_from(row)?;
            let n = seen.entry(charge.order_id.clone()).or_default();
            *n += 1;
            charge.id = format!("{}-{}", charge.order_id, n);
            Ok(charge)
        })
        .collect()
}

/// Decodes refunds and numbers them per order: `"{order_id}-R1"`, ...
pub fn decode_refunds(rows: Vec<RefundRow>) -> ValidationResult<Vec<Refund>> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    rows.into_iter()
        .map(|row| {
            let mut refund = Refund::try_from(row)?;
            let n = seen.entry(refund.order_id.clone()).or_default();
            *n += 1;
            refund.id = format!("{}-R{}", refund.order_id, n);
            Ok(refund)
        })
        .collect()
}

pub fn decode_ledger(rows: Vec<LedgerRow>) -> ValidationResult<Vec<LedgerTransaction>> {
    rows.into_iter().map(LedgerTransaction::try_from).collect()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::date;
    use crate::money::Money;
    use serde_json::json;

    fn item_row() -> serde_json::Value {
        json!({
            "Order Date": "02/26/14",
            "Order ID": "123-3211232-7655671",
            "Title": "Duracell AAs",
            "Category": "Misc.",
            "ASIN/ISBN": "B00009V2QX",
            "UNSPSC Code": "26111700",
            "Website": "Amazon.com",
            "Purchase Price Per Unit": "$5.45",
            "Quantity": "2",
            "Shipment Date": "02/28/14",
            "Order Status": "Shipped",
            "Carrier Name & Tracking Number": "AMZN(ABC123)",
            "Item Subtotal": "$10.90",
            "Item Subtotal Tax": "$1.05",
            "Item Total": "$11.95"
        })
    }

    fn charge_row(order_id: &str) -> ChargeRow {
        serde_json::from_value(json!({
            "Order Date": "02/26/14",
            "Order ID": order_id,
            "Payment Instrument Type": "Great Credit Card",
            "Website": "Amazon.com",
            "Shipment Date": "02/28/14",
            "Shipping Address Street 1": "The best city",
            "Shipping Address City": "SEATTLE",
            "Shipping Address State": "WA",
            "Shipping Address Zip": "98101-1001",
            "Order Status": "Shipped",
            "Carrier Name & Tracking Number": "AMZN(ABC123)",
            "Subtotal": "$10.90",
            "Shipping Charge": "$0.00",
            "Tax Before Promotions": "$1.05",
            "Total Promotions": "$0.00",
            "Tax Charged": "$1.05",
            "Total Charged": "$11.95"
        }))
        .unwrap()
    }

    #[test]
    fn test_item_row() {
        let row: ItemRow = serde_json::from_value(item_row()).unwrap();
        let item = LineItem::try_from(row).unwrap();

        assert_eq!(item.order_id, "123-3211232-7655671");
        assert_eq!(item.quantity, 2);
        assert_eq!(item.category_code, Some(26111700));
        assert_eq!(item.subtotal, Money::from_cents(1090));
        assert_eq!(item.tax, Money::from_cents(105));
        assert_eq!(item.total, Money::from_cents(1195));
        assert_eq!(item.ship_date, Some(date(2014, 2, 28)));
        assert!(item.is_shipped());
    }

    #[test]
    fn test_item_row_numeric_quantity_and_errors() {
        let mut value = item_row();
        value["Quantity"] = json!(3);
        let row: ItemRow = serde_json::from_value(value).unwrap();
        assert_eq!(LineItem::try_from(row).unwrap().quantity, 3);

        let mut value = item_row();
        value["Item Total"] = json!("lots");
        let row: ItemRow = serde_json::from_value(value).unwrap();
        let err = LineItem::try_from(row).unwrap_err();
        assert!(err.to_string().starts_with("Item Total has invalid format"));
    }

    #[test]
    fn test_decode_charges_numbers_per_order() {
        let charges =
            decode_charges(vec![charge_row("A"), charge_row("B"), charge_row("A")]).unwrap();
        let ids: Vec<&str> = charges.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["A-1", "B-1", "A-2"]);

        let c = &charges[0];
        assert_eq!(c.total, Money::from_cents(1195));
        assert_eq!(c.ship_address, " The best city SEATTLE WA 98101-1001 ");
        assert!(c.ship_address.contains(" WA "));
        assert!(!c.has_items());
    }

    #[test]
    fn test_refund_row() {
        let row: RefundRow = serde_json::from_value(json!({
            "Order ID": "A",
            "Order Date": "02/26/14",
            "Title": "Duracell AAs",
            "Refund Date": "03/16/14",
            "Refund Amount": "$10.90",
            "Refund Tax Amount": "$1.05",
            "Refund Reason": "Customer Return",
            "Quantity": 2
        }))
        .unwrap();
        let refunds = decode_refunds(vec![row.clone(), row]).unwrap();
        assert_eq!(refunds[0].id, "A-R1");
        assert_eq!(refunds[1].id, "A-R2");
        assert_eq!(refunds[0].transact_amount(), Money::from_cents(-1195));
        assert_eq!(refunds[0].refund_date, Some(date(2014, 3, 16)));
    }

    #[test]
    fn test_ledger_rows() {
        let rows: Vec<LedgerRow> = serde_json::from_value(json!([
            {
                "id": 1234,
                "date": "2/28/14",
                "odate": "2/28/14",
                "merchant": "Amazon",
                "omerchant": "AMAZON MKTPLACE PMTS",
                "amount": "$11.95",
                "isDebit": true,
                "category": "Personal Care",
                "note": "Great note here",
                "isPending": false,
                "isChild": false
            },
            {
                "id": "5678",
                "date": "2014-03-16",
                "merchant": "Amazon",
                "amount": "$11.95",
                "isDebit": false,
                "isChild": true,
                "pid": 99
            }
        ]))
        .unwrap();

        let txns = decode_ledger(rows).unwrap();
        assert_eq!(txns[0].id, "1234");
        assert_eq!(txns[0].amount, Money::from_cents(1195));
        assert_eq!(txns[0].date, date(2014, 2, 28));
        assert_eq!(txns[0].original_description, "AMAZON MKTPLACE PMTS");
        assert_eq!(txns[0].parent_id, None);

        assert_eq!(txns[1].amount, Money::from_cents(-1195));
        assert_eq!(txns[1].original_date, None);
        assert_eq!(txns[1].parent_id.as_deref(), Some("99"));
    }

    #[test]
    fn test_child_without_parent_id_is_rejected() {
        let row = LedgerRow {
            id: "1".to_string(),
            date: "2014-03-16".to_string(),
            amount: "$1.00".to_string(),
            is_child: true,
            ..LedgerRow::default()
        };
        assert!(LedgerTransaction::try_from(row).is_err());
    }
}
