//! # Category History
//!
//! Learns the categories a user assigned by hand to previously tagged
//! entries, so re-buying the same item gets the same category.
//!
//! ```text
//! "Amazon.com: 2x Duracell AAs"  category "Household"
//!        │  strip prefix, strip "2x ", lowercase
//!        ▼
//! "duracell aas" ──► most common category ──► "Household"
//! ```

use std::collections::HashMap;

use crate::records::LedgerTransaction;
use crate::title::strip_quantity_prefix;

/// Item name to the category the user most often picked for it.
#[derive(Debug, Clone, Default)]
pub struct CategoryHistory {
    by_item: HashMap<String, String>,
}

impl CategoryHistory {
    /// Builds the history from raw (not unsplit) ledger transactions.
    ///
    /// Only settled debits whose description starts with one of
    /// `prefixes` (lowercase, e.g. `"amazon.com: "`) are considered.
    /// Entries in `default_category` carry no signal, and entries whose
    /// name is in `non_items` (shipping, promotions, ...) are skipped. Ties
    /// go to the category seen first.
    pub fn learn(
        transactions: &[LedgerTransaction],
        prefixes: &[String],
        default_category: &str,
        non_items: &[&str],
    ) -> Self {
        let non_items: Vec<String> = non_items.iter().map(|n| n.to_lowercase()).collect();
        let mut counts: HashMap<String, Vec<(String, usize)>> = HashMap::new();

        for t in transactions {
            if t.is_pending || !t.is_debit() || t.category == default_category {
                continue;
            }
            let description = t.description.to_lowercase();
            let Some(rest) = prefixes.iter().find_map(|p| description.strip_prefix(p.as_str()))
            else {
                continue;
            };
            let name = strip_quantity_prefix(rest);
            if non_items.iter().any(|n| n == name) {
                continue;
            }

            let seen = counts.entry(name.to_string()).or_default();
            match seen.iter_mut().find(|(category, _)| *category == t.category) {
                Some((_, count)) => *count += 1,
                None => seen.push((t.category.clone(), 1)),
            }
        }

        let by_item = counts
            .into_iter()
            .filter_map(|(name, seen)| {
                let mut best: Option<(String, usize)> = None;
                for (category, count) in seen {
                    if best.as_ref().map_or(true, |(_, c)| count > *c) {
                        best = Some((category, count));
                    }
                }
                best.map(|(category, _)| (name, category))
            })
            .collect();

        Self { by_item }
    }

    /// Category learned for an unprefixed entry description.
    pub fn category_for(&self, description: &str) -> Option<&str> {
        let lowered = description.to_lowercase();
        self.by_item
            .get(strip_quantity_prefix(&lowered))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_item.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_item.is_empty()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{date, transaction};

    fn tagged(description: &str, category: &str) -> LedgerTransaction {
        let mut t = transaction("T", "$5.00", date(2021, 9, 1));
        t.description = description.to_string();
        t.category = category.to_string();
        t
    }

    fn learn(transactions: &[LedgerTransaction]) -> CategoryHistory {
        CategoryHistory::learn(
            transactions,
            &["amazon.com: ".to_string()],
            "Shopping",
            &["Shipping", "Promotion(s)"],
        )
    }

    #[test]
    fn test_most_common_category_wins() {
        let history = learn(&[
            tagged("Amazon.com: Duracell AAs", "Household"),
            tagged("Amazon.com: 2x Duracell AAs", "Electronics & Software"),
            tagged("Amazon.com: 3x Duracell AAs", "Electronics & Software"),
        ]);
        assert_eq!(history.len(), 1);
        assert_eq!(
            history.category_for("4x Duracell AAs"),
            Some("Electronics & Software")
        );
    }

    #[test]
    fn test_tie_goes_to_first_seen() {
        let history = learn(&[
            tagged("Amazon.com: USB Cable", "Electronics & Software"),
            tagged("Amazon.com: USB Cable", "Office Supplies"),
        ]);
        assert_eq!(history.category_for("USB Cable"), Some("Electronics & Software"));
    }

    #[test]
    fn test_filters() {
        let mut pending = tagged("Amazon.com: Pending Thing", "Books");
        pending.is_pending = true;
        let mut credit = tagged("Amazon.com: Credit Thing", "Books");
        credit.amount = -credit.amount;

        let history = learn(&[
            pending,
            credit,
            tagged("Amazon.com: Default Thing", "Shopping"),
            tagged("Amazon.com: Shipping", "Travel"),
            tagged("AMAZON MKTPLACE PMTS", "Books"),
        ]);
        assert!(history.is_empty());
    }
}
