//! # Record Model
//!
//! Typed records for both sides of a reconciliation run.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Record Types                                    │
//! │                                                                         │
//! │  Merchant side                          Ledger side                     │
//! │  ┌─────────────────┐                   ┌──────────────────────┐        │
//! │  │    Charge       │  matched to  ───► │  LedgerTransaction   │        │
//! │  │  ─────────────  │                   │  ──────────────────  │        │
//! │  │  order_id       │                   │  id, date, amount    │        │
//! │  │  subtotal/tax   │                   │  description         │        │
//! │  │  shipping/promo │                   │  children (splits)   │        │
//! │  │  items ─────────┼──► LineItem       └──────────┬───────────┘        │
//! │  └─────────────────┘                              │ replaced by         │
//! │  ┌─────────────────┐                              ▼                     │
//! │  │    Refund       │  matched to  ───►  ReplacementEntry (1..n)        │
//! │  └─────────────────┘                                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Sign Convention
//! Ledger amounts are outflow-positive: purchases are positive, refunds and
//! promotions negative. Every merchant record exposes a `transact_amount`
//! in the same convention.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::config::DeliveryFeeSettings;
use crate::error::{TaggerError, TaggerResult};
use crate::money::Money;
use crate::title::{item_title, ITEM_TITLE_LENGTH};

/// Title of the synthetic item created for unexplained extra charges.
pub const MISC_CHARGE_TITLE: &str = "Misc Charge (Gift wrap, etc)";

/// Printable invoice for an order id.
pub fn invoice_url(order_id: &str) -> String {
    format!(
        "https://www.amazon.com/gp/css/summary/print.html?ie=UTF8&orderID={}",
        order_id
    )
}

fn date_or_blank(date: Option<NaiveDate>) -> String {
    date.map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

// =============================================================================
// Item Status
// =============================================================================

/// Order status of a line item as reported by the merchant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ItemStatus {
    Shipped,
    Cancelled,
    /// Any other report status ("Shipping", "Ordered", ...).
    Other(String),
}

impl From<String> for ItemStatus {
    fn from(s: String) -> Self {
        match s.trim() {
            "Shipped" => ItemStatus::Shipped,
            "Cancelled" => ItemStatus::Cancelled,
            other => ItemStatus::Other(other.to_string()),
        }
    }
}

impl From<ItemStatus> for String {
    fn from(status: ItemStatus) -> Self {
        status.to_string()
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemStatus::Shipped => write!(f, "Shipped"),
            ItemStatus::Cancelled => write!(f, "Cancelled"),
            ItemStatus::Other(s) => write!(f, "{}", s),
        }
    }
}

// =============================================================================
// Line Item
// =============================================================================

/// One product line of an order.
///
/// Before association every item is split to quantity 1 so that units of
/// the same product shipped in different packages can land in different
/// charges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub order_id: String,
    pub title: String,

    /// Merchant catalog id (ASIN/ISBN).
    #[serde(default)]
    pub product_id: String,

    /// Numeric catalog category code, when reported.
    #[serde(default)]
    pub category_code: Option<u64>,

    pub quantity: u32,
    pub unit_price: Money,
    pub subtotal: Money,
    pub tax: Money,
    pub total: Money,

    #[serde(default)]
    pub tracking: String,
    #[serde(default)]
    pub order_date: Option<NaiveDate>,
    #[serde(default)]
    pub ship_date: Option<NaiveDate>,
    pub status: ItemStatus,
    #[serde(default)]
    pub website: String,
}

impl LineItem {
    pub fn is_cancelled(&self) -> bool {
        self.status == ItemStatus::Cancelled
    }

    pub fn is_shipped(&self) -> bool {
        self.status == ItemStatus::Shipped
    }

    pub fn sum_subtotals(items: &[LineItem]) -> Money {
        items.iter().map(|i| i.subtotal).sum()
    }

    pub fn sum_taxes(items: &[LineItem]) -> Money {
        items.iter().map(|i| i.tax).sum()
    }

    pub fn sum_totals(items: &[LineItem]) -> Money {
        items.iter().map(|i| i.total).sum()
    }

    /// Description used for this item's replacement entry.
    pub fn entry_title(&self) -> String {
        item_title(&self.title, self.quantity, ITEM_TITLE_LENGTH)
    }

    /// Splits this item into `quantity` items of quantity 1.
    ///
    /// Subtotal and tax are divided evenly; the micro-unit remainder goes
    /// one unit at a time to the first items, so the parts always sum to
    /// the original amounts.
    ///
    /// ```text
    /// qty 2, subtotal $10.90, tax $1.05
    ///      │
    ///      ▼
    /// [qty 1, $5.45, tax $0.525]  [qty 1, $5.45, tax $0.525]
    /// ```
    pub fn split_by_quantity(self) -> Vec<LineItem> {
        if self.quantity <= 1 {
            return vec![self];
        }

        let count = self.quantity as usize;
        let subtotals = self.subtotal.split_evenly(count);
        let taxes = self.tax.split_evenly(count);

        subtotals
            .into_iter()
            .zip(taxes)
            .map(|(subtotal, tax)| LineItem {
                quantity: 1,
                subtotal,
                tax,
                total: subtotal + tax,
                ..self.clone()
            })
            .collect()
    }

    /// Collapses identical items (same title, product id and per-unit
    /// subtotal) into one item carrying the summed quantity and amounts.
    ///
    /// First-seen order is preserved.
    pub fn merge_identical(items: Vec<LineItem>) -> Vec<LineItem> {
        if items.len() < 2 {
            return items;
        }

        let mut merged: Vec<LineItem> = Vec::new();
        let mut index: HashMap<(String, String, Money), usize> = HashMap::new();

        for item in items {
            let key = (
                item.title.clone(),
                item.product_id.clone(),
                item.unit_subtotal(),
            );
            match index.get(&key) {
                Some(&at) => {
                    let existing = &mut merged[at];
                    existing.quantity += item.quantity;
                    existing.subtotal += item.subtotal;
                    existing.tax += item.tax;
                    existing.total += item.total;
                }
                None => {
                    index.insert(key, merged.len());
                    merged.push(item);
                }
            }
        }
        merged
    }

    fn unit_subtotal(&self) -> Money {
        let qty = i64::from(self.quantity.max(1));
        Money::from_micros(self.subtotal.micros() / qty)
    }

    /// Synthetic item carrying an otherwise unexplained amount.
    pub fn misc_charge(template: &LineItem, amount: Money) -> LineItem {
        LineItem {
            title: MISC_CHARGE_TITLE.to_string(),
            product_id: String::new(),
            category_code: None,
            quantity: 1,
            unit_price: amount,
            subtotal: amount,
            tax: Money::zero(),
            total: amount,
            ..template.clone()
        }
    }
}

// =============================================================================
// Charge
// =============================================================================

/// A set of line items billed together: one shipment of one order.
///
/// The declared fields (`subtotal`, `tax`, `shipping`, `promotions`,
/// `total`) come from the merchant's order report. `items` is filled by
/// association. Reconciliation may rewrite both so that
/// `total_by_items()` agrees with `total`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Charge {
    pub id: String,
    pub order_id: String,

    #[serde(default)]
    pub order_date: Option<NaiveDate>,
    #[serde(default)]
    pub ship_date: Option<NaiveDate>,
    #[serde(default)]
    pub tracking: String,
    #[serde(default)]
    pub ship_address: String,
    #[serde(default)]
    pub payment_instrument: String,
    #[serde(default)]
    pub website: String,

    pub subtotal: Money,
    pub shipping: Money,
    pub promotions: Money,
    pub tax_before_promotions: Money,
    pub tax: Money,
    pub total: Money,

    /// Regional delivery fee billed on top of `total`.
    #[serde(default)]
    pub delivery_fee: Option<Money>,

    #[serde(default)]
    pub items: Vec<LineItem>,

    /// Ledger transaction this charge was matched to.
    #[serde(default)]
    pub matched_transaction: Option<String>,
}

impl Charge {
    /// Assigns items to this charge.
    ///
    /// A charge receives items exactly once; a second assignment means the
    /// association logic is broken.
    pub fn set_items(&mut self, items: Vec<LineItem>) -> TaggerResult<()> {
        if !self.items.is_empty() {
            return Err(TaggerError::ChargeAlreadyAssigned {
                charge_id: self.id.clone(),
            });
        }
        self.items = items;
        Ok(())
    }

    pub fn has_items(&self) -> bool {
        !self.items.is_empty()
    }

    pub fn is_matched(&self) -> bool {
        self.matched_transaction.is_some()
    }

    pub fn total_quantity(&self) -> i64 {
        self.items.iter().map(|i| i64::from(i.quantity)).sum()
    }

    /// Item totals plus shipping, less promotions.
    pub fn total_by_items(&self) -> Money {
        LineItem::sum_totals(&self.items) + self.shipping - self.promotions
    }

    /// Declared subtotal and tax plus shipping, less promotions.
    pub fn total_by_subtotals(&self) -> Money {
        self.subtotal + self.tax + self.shipping - self.promotions
    }

    /// True when the items explain the billed total.
    pub fn is_reconciled(&self, epsilon: Money) -> bool {
        self.total.nearly_equal_within(self.total_by_items(), epsilon)
    }

    /// Shipping fully offset by an equal promotion.
    pub fn is_free_shipping(&self, epsilon: Money) -> bool {
        !self.shipping.is_zero()
            && !self.promotions.is_zero()
            && self.shipping.nearly_equal_within(self.promotions, epsilon)
    }

    pub fn is_gift_card(&self) -> bool {
        self.payment_instrument.contains("Gift Certificate")
    }

    /// Amount the ledger should show for this charge alone.
    pub fn transact_amount(&self) -> Money {
        match self.delivery_fee {
            Some(fee) => (self.total + fee).round_to_cent(),
            None => self.total,
        }
    }

    /// Records the regional delivery fee when this charge owes it.
    pub fn apply_delivery_fee(&mut self, fee: &DeliveryFeeSettings) -> bool {
        let applies = self.ship_address.contains(&fee.region_marker)
            && self.tax.is_positive()
            && self.ship_date.is_some_and(|d| d >= fee.effective_from);
        self.delivery_fee = applies.then_some(fee.amount);
        applies
    }

    /// Note attached to every entry generated from this charge.
    pub fn note(&self) -> String {
        format!(
            "Order id: {}\nOrder date: {}\nShip date: {}\nTracking: {}\nInvoice url: {}",
            self.order_id,
            date_or_blank(self.order_date),
            date_or_blank(self.ship_date),
            self.tracking,
            invoice_url(&self.order_id)
        )
    }

    /// Merges charges billed as one ledger transaction.
    ///
    /// Items are concatenated and identical items collapsed; declared
    /// amounts are summed. Identity fields come from the first charge and
    /// the ship date is the latest one. Returns `None` for an empty slice.
    pub fn merge(charges: &[Charge]) -> Option<Charge> {
        let (first, rest) = charges.split_first()?;
        let mut merged = first.clone();

        for charge in rest {
            merged.items.extend(charge.items.iter().cloned());
            merged.subtotal += charge.subtotal;
            merged.shipping += charge.shipping;
            merged.promotions += charge.promotions;
            merged.tax_before_promotions += charge.tax_before_promotions;
            merged.tax += charge.tax;
            merged.total += charge.total;
            merged.delivery_fee = match (merged.delivery_fee, charge.delivery_fee) {
                (Some(a), Some(b)) => Some(a + b),
                (a, b) => a.or(b),
            };
            merged.ship_date = merged.ship_date.max(charge.ship_date);
        }

        merged.items = LineItem::merge_identical(merged.items);
        Some(merged)
    }
}

// =============================================================================
// Refund
// =============================================================================

/// A returned item credited back by the merchant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Refund {
    pub id: String,
    pub order_id: String,
    pub title: String,
    #[serde(default)]
    pub product_id: String,
    pub quantity: u32,

    /// Refunded amount before tax.
    pub amount: Money,
    pub tax: Money,

    #[serde(default)]
    pub order_date: Option<NaiveDate>,
    #[serde(default)]
    pub refund_date: Option<NaiveDate>,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub website: String,

    #[serde(default)]
    pub matched_transaction: Option<String>,
}

impl Refund {
    /// Refund amount plus refunded tax.
    pub fn total(&self) -> Money {
        self.amount + self.tax
    }

    pub fn is_matched(&self) -> bool {
        self.matched_transaction.is_some()
    }

    /// Refunds flow into the account, so the ledger shows them negative.
    pub fn transact_amount(&self) -> Money {
        -self.total()
    }

    pub fn entry_title(&self) -> String {
        item_title(&self.title, self.quantity, ITEM_TITLE_LENGTH)
    }

    pub fn note(&self) -> String {
        format!(
            "Refund for order id: {}\nOrder date: {}\nRefund date: {}\nRefund reason: {}\nInvoice url: {}",
            self.order_id,
            date_or_blank(self.order_date),
            date_or_blank(self.refund_date),
            self.reason,
            invoice_url(&self.order_id)
        )
    }

    /// Collapses identical refunds (same date, reason, title, total and
    /// product id) into one refund with summed quantity and amounts.
    pub fn merge_identical(refunds: Vec<Refund>) -> Vec<Refund> {
        if refunds.len() < 2 {
            return refunds;
        }

        type RefundKey = (Option<NaiveDate>, String, String, Money, String);
        let mut merged: Vec<Refund> = Vec::new();
        let mut index: HashMap<RefundKey, usize> = HashMap::new();

        for refund in refunds {
            let key = (
                refund.refund_date,
                refund.reason.clone(),
                refund.title.clone(),
                refund.total(),
                refund.product_id.clone(),
            );
            match index.get(&key) {
                Some(&at) => {
                    let existing = &mut merged[at];
                    existing.quantity += refund.quantity;
                    existing.amount += refund.amount;
                    existing.tax += refund.tax;
                }
                None => {
                    index.insert(key, merged.len());
                    merged.push(refund);
                }
            }
        }
        merged
    }
}

// =============================================================================
// Ledger Transaction
// =============================================================================

/// What kind of merchant records a transaction was matched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Charges,
    Refunds,
}

/// The merchant records a transaction was matched to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionMatch {
    pub kind: MatchKind,
    pub record_ids: Vec<String>,
}

/// One posted entry of the consolidated account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub id: String,
    pub date: NaiveDate,

    /// Date the entry originally posted, if the ledger moved it since.
    #[serde(default)]
    pub original_date: Option<NaiveDate>,

    /// Current (possibly user-edited) description.
    pub description: String,

    /// Description as first imported.
    #[serde(default)]
    pub original_description: String,

    /// Outflow positive.
    pub amount: Money,

    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub is_pending: bool,

    /// Set on the children of a previously split entry.
    #[serde(default)]
    pub parent_id: Option<String>,

    /// Children folded back in by [`LedgerTransaction::unsplit`].
    #[serde(default)]
    pub children: Vec<LedgerTransaction>,

    #[serde(default)]
    pub matched: Option<TransactionMatch>,
}

impl LedgerTransaction {
    pub fn is_debit(&self) -> bool {
        self.amount.is_positive()
    }

    pub fn is_matched(&self) -> bool {
        self.matched.is_some()
    }

    /// Date compared against ship and refund dates.
    pub fn match_date(&self) -> NaiveDate {
        self.original_date.unwrap_or(self.date)
    }

    pub fn sum_amounts(transactions: &[LedgerTransaction]) -> Money {
        transactions.iter().map(|t| t.amount).sum()
    }

    /// Reassembles previously split entries into one parent per parent id.
    ///
    /// ```text
    /// [A, child(P) $6.00, B, child(P) $14.00]
    ///      │
    ///      ▼
    /// [A, B, P $20.00 {children: [$6.00, $14.00]}]
    /// ```
    ///
    /// Unsplit entries keep their order; rebuilt parents follow in order of
    /// first appearance. A parent copies its first child, takes the parent
    /// id, and carries the cent-rounded sum of its children.
    pub fn unsplit(transactions: Vec<LedgerTransaction>) -> Vec<LedgerTransaction> {
        let mut result = Vec::new();
        let mut parent_order: Vec<String> = Vec::new();
        let mut children_by_parent: HashMap<String, Vec<LedgerTransaction>> = HashMap::new();

        for transaction in transactions {
            match transaction.parent_id.clone() {
                Some(parent_id) => {
                    if !children_by_parent.contains_key(&parent_id) {
                        parent_order.push(parent_id.clone());
                    }
                    children_by_parent
                        .entry(parent_id)
                        .or_default()
                        .push(transaction);
                }
                None => result.push(transaction),
            }
        }

        for parent_id in parent_order {
            let Some(children) = children_by_parent.remove(&parent_id) else {
                continue;
            };
            let Some(first) = children.first() else {
                continue;
            };
            let parent = LedgerTransaction {
                id: parent_id,
                parent_id: None,
                amount: LedgerTransaction::sum_amounts(&children).round_to_cent(),
                children: Vec::new(),
                matched: None,
                ..first.clone()
            };
            result.push(LedgerTransaction { children, ..parent });
        }
        result
    }

    /// Comparison keys of what the ledger shows today: the children if the
    /// entry was split, otherwise the entry itself.
    pub fn current_keys(&self, ignore_category: bool) -> Vec<EntryKey> {
        if self.children.is_empty() {
            vec![EntryKey::new(
                &self.description,
                self.amount,
                &self.note,
                &self.category,
                ignore_category,
            )]
        } else {
            self.children
                .iter()
                .flat_map(|c| c.current_keys(ignore_category))
                .collect()
        }
    }
}

// =============================================================================
// Replacement Entry
// =============================================================================

/// A proposed ledger entry derived from a matched transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplacementEntry {
    /// Id of the transaction this entry replaces or splits.
    pub parent_id: String,
    pub date: NaiveDate,
    pub description: String,
    pub category: String,
    pub amount: Money,
    pub note: String,
}

impl ReplacementEntry {
    pub fn sum_amounts(entries: &[ReplacementEntry]) -> Money {
        entries.iter().map(|e| e.amount).sum()
    }

    pub fn key(&self, ignore_category: bool) -> EntryKey {
        EntryKey::new(
            &self.description,
            self.amount,
            &self.note,
            &self.category,
            ignore_category,
        )
    }
}

/// What makes two ledger entries "the same" to a reader: description,
/// displayed amount, note and (optionally) category.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryKey {
    pub description: String,
    pub amount: String,
    pub note: String,
    pub category: Option<String>,
}

impl EntryKey {
    fn new(
        description: &str,
        amount: Money,
        note: &str,
        category: &str,
        ignore_category: bool,
    ) -> Self {
        EntryKey {
            description: description.to_string(),
            amount: amount.to_string(),
            note: note.to_string(),
            category: (!ignore_category).then(|| category.to_string()),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
