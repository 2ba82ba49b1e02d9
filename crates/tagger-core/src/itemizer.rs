//! # Itemizer
//!
//! Turns a matched transaction and its merchant records into the ledger
//! entries that replace it.
//!
//! ## Entry Layout
//! ```text
//! Transaction $20.00  ◄── charges [c1, c2] (merged)
//!     │
//!     ▼
//! ┌──────────────────────────────────────────────┬──────────┬───────────┐
//! │ description                                  │ amount   │ category  │
//! ├──────────────────────────────────────────────┼──────────┼───────────┤
//! │ 3x Item 2                                    │  $14.00  │ mapped    │  items,
//! │ Item 1                                       │   $6.00  │ mapped    │  highest first
//! │ Retail Delivery Fee                          │   $0.27  │ Shipping  │  when owed
//! │ Shipping                                     │   $3.99  │ Shipping  │
//! │ Promotion(s)                                 │  -$3.99  │ Shipping* │
//! └──────────────────────────────────────────────┴──────────┴───────────┘
//!   * Shipping when the promotion exactly cancels shipping, else default
//! ```
//!
//! Free shipping (shipping fully offset by a promotion) can be suppressed,
//! dropping both rows. The entries then go through either [`itemize`]
//! (prefix every description) or [`Itemizer::summarize`] (one entry for the whole
//! transaction). Whatever the shape, the amounts must add up to the
//! transaction; [`verify_sum`] enforces that.

use std::collections::HashMap;

use crate::category::CategoryMapper;
use crate::error::{TaggerError, TaggerResult};
use crate::money::Money;
use crate::records::{Charge, LedgerTransaction, Refund, ReplacementEntry, MISC_CHARGE_TITLE};
use crate::title::summarize_titles;

pub const SHIPPING_DESCRIPTION: &str = "Shipping";
pub const PROMOTION_DESCRIPTION: &str = "Promotion(s)";
pub const TAX_ADJUSTMENT_DESCRIPTION: &str = "Tax adjustment";

/// Descriptions of entries that are not purchased items.
pub const NON_ITEM_DESCRIPTIONS: [&str; 4] = [
    MISC_CHARGE_TITLE,
    PROMOTION_DESCRIPTION,
    SHIPPING_DESCRIPTION,
    TAX_ADJUSTMENT_DESCRIPTION,
];

/// Catalog code of purchased items keyed by (title, order id).
pub type PurchasedCodes = HashMap<(String, String), Option<u64>>;

/// Builds replacement entries for matched transactions.
#[derive(Debug, Clone, Copy)]
pub struct Itemizer<'a> {
    categories: &'a CategoryMapper,
    epsilon: Money,
    suppress_free_shipping: bool,
    fee_description: Option<&'a str>,
}

impl<'a> Itemizer<'a> {
    pub fn new(
        categories: &'a CategoryMapper,
        epsilon: Money,
        suppress_free_shipping: bool,
        fee_description: Option<&'a str>,
    ) -> Self {
        Self {
            categories,
            epsilon,
            suppress_free_shipping,
            fee_description,
        }
    }

    /// True for shipping, promotion, misc and fee entries.
    pub fn is_non_item(&self, description: &str) -> bool {
        NON_ITEM_DESCRIPTIONS.contains(&description) || self.fee_description == Some(description)
    }

    /// Entries for a transaction paying one or more charges.
    pub fn charge_entries(
        &self,
        transaction: &LedgerTransaction,
        charges: &[Charge],
    ) -> TaggerResult<Vec<ReplacementEntry>> {
        let charge = Charge::merge(charges).ok_or_else(|| TaggerError::EmptyCharge {
            charge_id: transaction.id.clone(),
        })?;
        if !charge.has_items() {
            return Err(TaggerError::EmptyCharge {
                charge_id: charge.id.clone(),
            });
        }

        let note = charge.note();
        let entry = |description: String, category: &str, amount: Money| ReplacementEntry {
            parent_id: transaction.id.clone(),
            date: transaction.date,
            description,
            category: category.to_string(),
            amount,
            note: note.clone(),
        };

        let mut items = charge.items.clone();
        items.sort_by(|a, b| b.total.cmp(&a.total));

        let mut entries: Vec<ReplacementEntry> = items
            .iter()
            .map(|item| {
                let category = self.categories.category_for(item.category_code);
                entry(item.entry_title(), &category, item.total)
            })
            .collect();

        if let Some(fee) = charge.delivery_fee {
            let description = self.fee_description.unwrap_or("Delivery Fee");
            entries.push(entry(
                description.to_string(),
                self.categories.shipping_category(),
                fee,
            ));
        }

        let free_shipping = charge.is_free_shipping(self.epsilon);
        if free_shipping && self.suppress_free_shipping {
            return Ok(entries);
        }

        if !charge.shipping.is_zero() {
            entries.push(entry(
                SHIPPING_DESCRIPTION.to_string(),
                self.categories.shipping_category(),
                charge.shipping,
            ));
        }

        if !charge.promotions.is_zero() {
            let category = if free_shipping {
                self.categories.shipping_category()
            } else {
                self.categories.default_category()
            };
            entries.push(entry(
                PROMOTION_DESCRIPTION.to_string(),
                category,
                -charge.promotions,
            ));
        }

        Ok(entries)
    }

    /// Entries for a transaction crediting one or more refunds.
    ///
    /// A refund lands in the returns category unless the purchased item is
    /// known, in which case it takes that item's category.
    pub fn refund_entries(
        &self,
        transaction: &LedgerTransaction,
        refunds: &[Refund],
        purchased: &PurchasedCodes,
    ) -> Vec<ReplacementEntry> {
        Refund::merge_identical(refunds.to_vec())
            .into_iter()
            .map(|refund| {
                let code = purchased
                    .get(&(refund.title.clone(), refund.order_id.clone()))
                    .copied()
                    .flatten();
                let category = match code {
                    Some(_) => self.categories.category_for(code),
                    None => self.categories.returns_category().to_string(),
                };
                ReplacementEntry {
                    parent_id: transaction.id.clone(),
                    date: transaction.date,
                    description: refund.entry_title(),
                    category,
                    amount: refund.transact_amount(),
                    note: refund.note(),
                }
            })
            .collect()
    }

    /// Collapses `entries` into one entry carrying the whole transaction.
    ///
    /// The description joins the item titles after `prefix`; the note lists
    /// every entry. With exactly one item its category is kept, otherwise
    /// the default category is used.
    pub fn summarize(
        &self,
        transaction: &LedgerTransaction,
        entries: &[ReplacementEntry],
        prefix: &str,
    ) -> ReplacementEntry {
        let item_entries: Vec<&ReplacementEntry> = entries
            .iter()
            .filter(|e| !self.is_non_item(&e.description))
            .collect();
        let titles: Vec<&str> = item_entries.iter().map(|e| e.description.as_str()).collect();

        let category = match item_entries.as_slice() {
            [only] => only.category.clone(),
            _ => self.categories.default_category().to_string(),
        };

        let listing: Vec<String> = entries
            .iter()
            .map(|e| format!(" - {}", e.description))
            .collect();
        let first_note = entries.first().map(|e| e.note.as_str()).unwrap_or_default();

        ReplacementEntry {
            parent_id: transaction.id.clone(),
            date: transaction.date,
            description: summarize_titles(&titles, prefix),
            category,
            amount: transaction.amount,
            note: format!("{}\nItem(s):\n{}", first_note, listing.join("\n")),
        }
    }
}

/// Prefixes every entry description, keeping highest-first order.
pub fn itemize(entries: Vec<ReplacementEntry>, prefix: &str) -> Vec<ReplacementEntry> {
    entries
        .into_iter()
        .map(|e| ReplacementEntry {
            description: format!("{}{}", prefix, e.description),
            ..e
        })
        .collect()
}

/// Fails unless `entries` add up to the transaction amount.
pub fn verify_sum(
    transaction: &LedgerTransaction,
    entries: &[ReplacementEntry],
    epsilon: Money,
) -> TaggerResult<()> {
    let actual = ReplacementEntry::sum_amounts(entries);
    if !actual.nearly_equal_within(transaction.amount, epsilon) {
        return Err(TaggerError::ItemizedSumMismatch {
            transaction_id: transaction.id.clone(),
            expected: transaction.amount,
            actual,
        });
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CategorySettings;
    use crate::fixtures::{charge, date, item, refund, transaction};

    fn mapper() -> CategoryMapper {
        CategoryMapper::new(&CategorySettings::default())
    }

    fn free_shipping_charge() -> Charge {
        let mut c = charge("A", "$20.00", "$20.00");
        c.shipping = Money::from_cents(399);
        c.promotions = Money::from_cents(399);

        let mut first = item("A", "$6.00");
        first.title = "Item 1".to_string();
        first.category_code = Some(43211617);
        let mut second = item("A", "$14.00");
        second.title = "Item 2".to_string();
        second.quantity = 3;
        c.set_items(vec![first, second]).unwrap();
        c
    }

    #[test]
    fn test_charge_entries_with_free_shipping() {
        let categories = mapper();
        let itemizer = Itemizer::new(&categories, Money::EPSILON, false, None);
        let t = transaction("T1", "$20.00", date(2021, 10, 14));

        let entries = itemizer
            .charge_entries(&t, &[free_shipping_charge()])
            .unwrap();
        assert_eq!(entries.len(), 4);

        assert_eq!(entries[0].description, "3x Item 2");
        assert_eq!(entries[0].amount, Money::from_cents(1400));
        assert_eq!(entries[0].category, "Shopping");
        assert_eq!(entries[1].description, "Item 1");
        assert_eq!(entries[1].category, "Electronics & Software");
        assert_eq!(entries[2].description, "Shipping");
        assert_eq!(entries[2].amount, Money::from_cents(399));
        assert_eq!(entries[3].description, "Promotion(s)");
        assert_eq!(entries[3].amount, Money::from_cents(-399));
        assert_eq!(entries[3].category, "Shipping");

        assert!(entries.iter().all(|e| e.parent_id == "T1"));
        assert!(entries[0].note.starts_with("Order id: A\n"));
        verify_sum(&t, &entries, Money::EPSILON).unwrap();
    }

    #[test]
    fn test_free_shipping_suppressed() {
        let categories = mapper();
        let itemizer = Itemizer::new(&categories, Money::EPSILON, true, None);
        let t = transaction("T1", "$20.00", date(2021, 10, 14));

        let entries = itemizer
            .charge_entries(&t, &[free_shipping_charge()])
            .unwrap();
        assert_eq!(entries.len(), 2);
        verify_sum(&t, &entries, Money::EPSILON).unwrap();
    }

    #[test]
    fn test_partial_promotion_uses_default_category() {
        let categories = mapper();
        let itemizer = Itemizer::new(&categories, Money::EPSILON, true, None);
        let t = transaction("T1", "$11.00", date(2021, 10, 14));

        let mut c = charge("A", "$10.00", "$11.00");
        c.shipping = Money::from_cents(300);
        c.promotions = Money::from_cents(200);
        c.set_items(vec![item("A", "$10.00")]).unwrap();

        let entries = itemizer.charge_entries(&t, &[c]).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[2].description, "Promotion(s)");
        assert_eq!(entries[2].category, "Shopping");
        verify_sum(&t, &entries, Money::EPSILON).unwrap();
    }

    #[test]
    fn test_delivery_fee_entry() {
        let categories = mapper();
        let itemizer =
            Itemizer::new(&categories, Money::EPSILON, true, Some("Retail Delivery Fee"));
        let t = transaction("T1", "$10.27", date(2021, 10, 14));

        let mut c = charge("A", "$10.00", "$10.00");
        c.delivery_fee = Some(Money::from_cents(27));
        c.set_items(vec![item("A", "$10.00")]).unwrap();

        let entries = itemizer.charge_entries(&t, &[c]).unwrap();
        assert_eq!(entries[1].description, "Retail Delivery Fee");
        assert_eq!(entries[1].category, "Shipping");
        assert!(itemizer.is_non_item("Retail Delivery Fee"));
        verify_sum(&t, &entries, Money::EPSILON).unwrap();
    }

    #[test]
    fn test_charge_without_items_is_an_error() {
        let categories = mapper();
        let itemizer = Itemizer::new(&categories, Money::EPSILON, true, None);
        let t = transaction("T1", "$10.00", date(2021, 10, 14));

        let err = itemizer
            .charge_entries(&t, &[charge("A", "$10.00", "$10.00")])
            .unwrap_err();
        assert!(matches!(err, TaggerError::EmptyCharge { .. }));
        assert!(itemizer.charge_entries(&t, &[]).is_err());
    }

    #[test]
    fn test_summarize() {
        let categories = mapper();
        let itemizer = Itemizer::new(&categories, Money::EPSILON, false, None);
        let t = transaction("T1", "$20.00", date(2021, 10, 14));
        let entries = itemizer
            .charge_entries(&t, &[free_shipping_charge()])
            .unwrap();

        let summary = itemizer.summarize(&t, &entries, "Amazon.com: ");
        assert_eq!(summary.description, "Amazon.com: 3x Item 2, Item 1");
        assert_eq!(summary.category, "Shopping");
        assert_eq!(summary.amount, Money::from_cents(2000));
        assert!(summary.note.ends_with(
            "\nItem(s):\n - 3x Item 2\n - Item 1\n - Shipping\n - Promotion(s)"
        ));
        verify_sum(&t, &[summary], Money::EPSILON).unwrap();
    }

    #[test]
    fn test_summarize_single_item_keeps_category() {
        let categories = mapper();
        let itemizer = Itemizer::new(&categories, Money::EPSILON, true, None);
        let t = transaction("T1", "$11.95", date(2021, 10, 14));

        let mut c = charge("A", "$10.90", "$11.95");
        c.tax = Money::from_cents(105);
        let mut duracell = item("A", "$10.90");
        duracell.quantity = 2;
        duracell.tax = Money::from_cents(105);
        duracell.total = Money::from_cents(1195);
        duracell.category_code = Some(26111702);
        c.set_items(vec![duracell]).unwrap();

        let entries = itemizer.charge_entries(&t, &[c]).unwrap();
        let summary = itemizer.summarize(&t, &entries, "Amazon.com: ");
        assert_eq!(summary.description, "Amazon.com: 2x Duracell AAs");
        assert_eq!(summary.category, "Electronics & Software");
    }

    #[test]
    fn test_itemize_prefixes_descriptions() {
        let categories = mapper();
        let itemizer = Itemizer::new(&categories, Money::EPSILON, false, None);
        let t = transaction("T1", "$20.00", date(2021, 10, 14));
        let entries = itemizer
            .charge_entries(&t, &[free_shipping_charge()])
            .unwrap();

        let itemized = itemize(entries, "Amazon.com: ");
        assert_eq!(itemized[0].description, "Amazon.com: 3x Item 2");
        assert_eq!(itemized[3].description, "Amazon.com: Promotion(s)");
    }

    #[test]
    fn test_refund_entries() {
        let categories = mapper();
        let itemizer = Itemizer::new(&categories, Money::EPSILON, true, None);
        let t = transaction("T1", "-$21.60", date(2021, 10, 21));

        let first = refund("A", "$10.00", "$0.80");
        let mut second = first.clone();
        second.id = "A-R2".to_string();

        let mut purchased = PurchasedCodes::new();
        let entries = itemizer.refund_entries(&t, &[first.clone(), second.clone()], &purchased);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].description, "2x Duracell AAs");
        assert_eq!(entries[0].amount, Money::from_cents(-2160));
        assert_eq!(entries[0].category, "Returned Purchase");
        verify_sum(&t, &entries, Money::EPSILON).unwrap();

        purchased.insert(("Duracell AAs".to_string(), "A".to_string()), Some(26111702));
        let entries = itemizer.refund_entries(&t, &[first, second], &purchased);
        assert_eq!(entries[0].category, "Electronics & Software");
    }

    #[test]
    fn test_verify_sum_mismatch() {
        let t = transaction("T1", "$20.00", date(2021, 10, 14));
        let e = vec![ReplacementEntry {
            parent_id: "T1".to_string(),
            date: t.date,
            description: "Item".to_string(),
            category: "Shopping".to_string(),
            amount: Money::from_cents(1999),
            note: String::new(),
        }];
        let err = verify_sum(&t, &e, Money::EPSILON).unwrap_err();
        assert!(matches!(err, TaggerError::ItemizedSumMismatch { .. }));
    }
}
