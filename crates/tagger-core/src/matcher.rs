//! # Transaction Matching
//!
//! Pairs ledger transactions with the merchant records they pay for.
//!
//! ## Passes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      match_transactions()                               │
//! │                                                                         │
//! │  Pass A: singletons                                                    │
//! │    amount ──► [ [c1], [c4] ]        one record per candidate           │
//! │                                                                         │
//! │  Pass B: combinations within one order id (still unmatched only)       │
//! │    amount ──► [ [c2,c3], [c2,c5] ]  every subset of size 2..n          │
//! │    orders with more than max_charges_per_combination records skipped  │
//! │                                                                         │
//! │  Best candidate for a transaction:                                     │
//! │    • no member already matched                                         │
//! │    • latest member date within max_days of the transaction date        │
//! │    • fewest days apart, then lexicographically smallest id list        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Amounts compare exactly: both sides are whole cents by the time they get
//! here. Matching is terminal; a matched record or transaction is never
//! reconsidered.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

use crate::money::Money;
use crate::records::{Charge, LedgerTransaction, MatchKind, Refund, TransactionMatch};

// =============================================================================
// Matchable Records
// =============================================================================

/// A merchant record that can be paired with a ledger transaction.
pub trait Matchable {
    /// Kind recorded on the transaction when matched.
    const KIND: MatchKind;

    fn record_id(&self) -> &str;
    fn record_order_id(&self) -> &str;
    /// Signed amount the ledger is expected to show (outflow positive).
    fn amount_owed(&self) -> Money;
    /// Date the ledger entry is expected near.
    fn transact_date(&self) -> Option<NaiveDate>;
    fn matched(&self) -> bool;
    fn mark_matched(&mut self, transaction_id: &str);
}

impl Matchable for Charge {
    const KIND: MatchKind = MatchKind::Charges;

    fn record_id(&self) -> &str {
        &self.id
    }

    fn record_order_id(&self) -> &str {
        &self.order_id
    }

    fn amount_owed(&self) -> Money {
        self.transact_amount()
    }

    fn transact_date(&self) -> Option<NaiveDate> {
        self.ship_date
    }

    fn matched(&self) -> bool {
        self.is_matched()
    }

    fn mark_matched(&mut self, transaction_id: &str) {
        self.matched_transaction = Some(transaction_id.to_string());
    }
}

impl Matchable for Refund {
    const KIND: MatchKind = MatchKind::Refunds;

    fn record_id(&self) -> &str {
        &self.id
    }

    fn record_order_id(&self) -> &str {
        &self.order_id
    }

    fn amount_owed(&self) -> Money {
        self.transact_amount()
    }

    fn transact_date(&self) -> Option<NaiveDate> {
        self.refund_date
    }

    fn matched(&self) -> bool {
        self.is_matched()
    }

    fn mark_matched(&mut self, transaction_id: &str) {
        self.matched_transaction = Some(transaction_id.to_string());
    }
}

// =============================================================================
// Options & Report
// =============================================================================

#[derive(Debug, Clone, Copy)]
pub struct MatchOptions {
    /// Largest allowed gap between transaction date and record date.
    pub max_days: i64,
    /// Orders with more unmatched records than this skip Pass B.
    pub max_records_per_combination: usize,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            max_days: 3,
            max_records_per_combination: 8,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchReport {
    pub singleton_matches: usize,
    pub combination_matches: usize,
    /// Orders whose record count exceeded the combination bound.
    pub skipped_orders: Vec<String>,
}

/// Candidate record groups keyed by their summed amount. Groups are record
/// indices, kept in the order they were generated.
type AmountIndex = HashMap<Money, Vec<Vec<usize>>>;

// =============================================================================
// Matching
// =============================================================================

/// Matches unmatched `transactions` against unmatched `records`.
///
/// Transactions that already carry a match are left alone, so charges and
/// refunds can be matched in two successive calls over the same ledger.
pub fn match_transactions<T: Matchable>(
    transactions: &mut [LedgerTransaction],
    records: &mut [T],
    options: &MatchOptions,
) -> MatchReport {
    let mut report = MatchReport::default();

    // Pass A: one record per candidate.
    let mut singles: AmountIndex = HashMap::new();
    for (index, record) in records.iter().enumerate() {
        if !record.matched() {
            singles
                .entry(record.amount_owed())
                .or_default()
                .push(vec![index]);
        }
    }
    report.singleton_matches = match_pass(transactions, records, &singles, options);

    // Pass B: combinations of records sharing an order id.
    let mut by_order: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (index, record) in records.iter().enumerate() {
        if !record.matched() {
            by_order
                .entry(record.record_order_id())
                .or_default()
                .push(index);
        }
    }

    let mut combos: AmountIndex = HashMap::new();
    for (order_id, indices) in &by_order {
        if indices.len() < 2 {
            continue;
        }
        if indices.len() > options.max_records_per_combination {
            warn!(
                order_id = %order_id,
                records = indices.len(),
                bound = options.max_records_per_combination,
                "Too many records to combine; skipping order"
            );
            report.skipped_orders.push(order_id.to_string());
            continue;
        }
        for size in 2..=indices.len() {
            for picks in combinations(indices.len(), size) {
                let group: Vec<usize> = picks.iter().map(|&p| indices[p]).collect();
                let amount: Money = group.iter().map(|&i| records[i].amount_owed()).sum();
                combos.entry(amount).or_default().push(group);
            }
        }
    }
    report.combination_matches = match_pass(transactions, records, &combos, options);

    report
}

fn match_pass<T: Matchable>(
    transactions: &mut [LedgerTransaction],
    records: &mut [T],
    index: &AmountIndex,
    options: &MatchOptions,
) -> usize {
    let mut matched = 0;
    for transaction in transactions.iter_mut().filter(|t| !t.is_matched()) {
        let Some(candidates) = index.get(&transaction.amount) else {
            continue;
        };
        let Some(best) = best_candidate(transaction, candidates, records, options) else {
            continue;
        };

        let record_ids: Vec<String> = best
            .iter()
            .map(|&i| records[i].record_id().to_string())
            .collect();
        for &i in best {
            records[i].mark_matched(&transaction.id);
        }
        debug!(
            transaction_id = %transaction.id,
            amount = %transaction.amount,
            records = ?record_ids,
            "Matched transaction"
        );
        transaction.matched = Some(TransactionMatch {
            kind: T::KIND,
            record_ids,
        });
        matched += 1;
    }
    matched
}

/// Picks the candidate group dated closest to the transaction.
fn best_candidate<'a, T: Matchable>(
    transaction: &LedgerTransaction,
    candidates: &'a [Vec<usize>],
    records: &[T],
    options: &MatchOptions,
) -> Option<&'a [usize]> {
    let mut best: Option<(i64, Vec<&str>, &'a [usize])> = None;

    for group in candidates {
        if group.iter().any(|&i| records[i].matched()) {
            continue;
        }
        let Some(date) = group.iter().filter_map(|&i| records[i].transact_date()).max() else {
            continue;
        };
        let days = (transaction.match_date() - date).num_days().abs();
        if days > options.max_days {
            continue;
        }

        let ids: Vec<&str> = group.iter().map(|&i| records[i].record_id()).collect();
        let closer = match &best {
            None => true,
            Some((best_days, best_ids, _)) => (days, &ids) < (*best_days, best_ids),
        };
        if closer {
            best = Some((days, ids, group.as_slice()));
        }
    }

    best.map(|(_, _, group)| group)
}

/// All `size`-element index subsets of `0..n`, in lexicographic order.
fn combinations(n: usize, size: usize) -> Vec<Vec<usize>> {
    let mut result = Vec::new();
    if size == 0 || size > n {
        return result;
    }
    let mut picks: Vec<usize> = (0..size).collect();
    loop {
        result.push(picks.clone());

        // Rightmost position that can still move right.
        let Some(pos) = (0..size).rev().find(|&p| picks[p] < n - size + p) else {
            return result;
        };
        picks[pos] += 1;
        for next in pos + 1..size {
            picks[next] = picks[next - 1] + 1;
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{charge, date, refund, transaction};

    fn shipped(id: &str, order_id: &str, total: &str, ship: NaiveDate) -> Charge {
        let mut c = charge(order_id, total, total);
        c.id = id.to_string();
        c.ship_date = Some(ship);
        c
    }

    #[test]
    fn test_combinations() {
        assert_eq!(
            combinations(4, 2),
            vec![
                vec![0, 1],
                vec![0, 2],
                vec![0, 3],
                vec![1, 2],
                vec![1, 3],
                vec![2, 3]
            ]
        );
        assert_eq!(combinations(3, 3), vec![vec![0, 1, 2]]);
        assert!(combinations(2, 3).is_empty());
    }

    #[test]
    fn test_singleton_match() {
        let mut charges = vec![shipped("c1", "A", "$11.95", date(2021, 10, 13))];
        let mut txns = vec![transaction("T1", "$11.95", date(2021, 10, 14))];

        let report = match_transactions(&mut txns, &mut charges, &MatchOptions::default());
        assert_eq!(report.singleton_matches, 1);
        assert_eq!(charges[0].matched_transaction.as_deref(), Some("T1"));
        let m = txns[0].matched.as_ref().unwrap();
        assert_eq!(m.kind, MatchKind::Charges);
        assert_eq!(m.record_ids, vec!["c1".to_string()]);
    }

    #[test]
    fn test_outside_day_window() {
        let mut charges = vec![shipped("c1", "A", "$11.95", date(2021, 10, 1))];
        let mut txns = vec![transaction("T1", "$11.95", date(2021, 10, 14))];

        let report = match_transactions(&mut txns, &mut charges, &MatchOptions::default());
        assert_eq!(report.singleton_matches, 0);
        assert!(!charges[0].is_matched());
        assert!(!txns[0].is_matched());
    }

    #[test]
    fn test_original_date_is_used() {
        let mut charges = vec![shipped("c1", "A", "$11.95", date(2021, 10, 1))];
        let mut txn = transaction("T1", "$11.95", date(2021, 10, 14));
        txn.original_date = Some(date(2021, 10, 2));
        let mut txns = vec![txn];

        match_transactions(&mut txns, &mut charges, &MatchOptions::default());
        assert!(txns[0].is_matched());
    }

    #[test]
    fn test_closest_date_wins() {
        let mut charges = vec![
            shipped("c1", "A", "$5.00", date(2021, 10, 11)),
            shipped("c2", "B", "$5.00", date(2021, 10, 13)),
        ];
        let mut txns = vec![
            transaction("T1", "$5.00", date(2021, 10, 13)),
            transaction("T2", "$5.00", date(2021, 10, 12)),
        ];

        match_transactions(&mut txns, &mut charges, &MatchOptions::default());
        assert_eq!(charges[1].matched_transaction.as_deref(), Some("T1"));
        assert_eq!(charges[0].matched_transaction.as_deref(), Some("T2"));
    }

    #[test]
    fn test_tie_breaks_on_record_ids() {
        let mut charges = vec![
            shipped("c2", "B", "$5.00", date(2021, 10, 12)),
            shipped("c1", "A", "$5.00", date(2021, 10, 14)),
        ];
        let mut txns = vec![transaction("T1", "$5.00", date(2021, 10, 13))];

        match_transactions(&mut txns, &mut charges, &MatchOptions::default());
        assert!(!charges[0].is_matched());
        assert_eq!(charges[1].matched_transaction.as_deref(), Some("T1"));
    }

    #[test]
    fn test_group_with_matched_member_is_skipped() {
        // Amount $8.00: [c1,c2] and [c1,c3] ship on the 13th, [c2,c4] and
        // [c3,c4] on the 10th.
        let mut charges = vec![
            shipped("c1", "A", "$5.00", date(2021, 10, 13)),
            shipped("c2", "A", "$3.00", date(2021, 10, 10)),
            shipped("c3", "A", "$3.00", date(2021, 10, 10)),
            shipped("c4", "A", "$5.00", date(2021, 10, 10)),
        ];
        let mut txns = vec![
            transaction("T1", "$8.00", date(2021, 10, 13)),
            transaction("T2", "$8.00", date(2021, 10, 13)),
        ];

        let report = match_transactions(&mut txns, &mut charges, &MatchOptions::default());
        assert_eq!(report.combination_matches, 2);
        assert_eq!(txns[0].matched.as_ref().unwrap().record_ids, vec!["c1", "c2"]);
        // [c1,c3] is closer but c1 is taken.
        assert_eq!(txns[1].matched.as_ref().unwrap().record_ids, vec!["c3", "c4"]);
        assert_eq!(charges[0].matched_transaction.as_deref(), Some("T1"));
        assert_eq!(charges[3].matched_transaction.as_deref(), Some("T2"));
    }

    #[test]
    fn test_combination_match() {
        let mut charges = vec![
            shipped("c1", "A", "$10.00", date(2021, 10, 12)),
            shipped("c2", "A", "$4.00", date(2021, 10, 13)),
            shipped("c3", "B", "$4.00", date(2021, 10, 13)),
        ];
        let mut txns = vec![transaction("T1", "$14.00", date(2021, 10, 14))];

        let report = match_transactions(&mut txns, &mut charges, &MatchOptions::default());
        assert_eq!(report.singleton_matches, 0);
        assert_eq!(report.combination_matches, 1);
        assert!(charges[0].is_matched());
        assert!(charges[1].is_matched());
        assert!(!charges[2].is_matched());
        assert_eq!(
            txns[0].matched.as_ref().unwrap().record_ids,
            vec!["c1".to_string(), "c2".to_string()]
        );
    }

    #[test]
    fn test_combination_uses_latest_date() {
        let mut charges = vec![
            shipped("c1", "A", "$10.00", date(2021, 10, 1)),
            shipped("c2", "A", "$4.00", date(2021, 10, 13)),
        ];
        let mut txns = vec![transaction("T1", "$14.00", date(2021, 10, 14))];

        match_transactions(&mut txns, &mut charges, &MatchOptions::default());
        assert!(txns[0].is_matched());
    }

    #[test]
    fn test_combination_bound_skips_order() {
        let mut charges = vec![
            shipped("c1", "A", "$1.00", date(2021, 10, 13)),
            shipped("c2", "A", "$2.00", date(2021, 10, 13)),
            shipped("c3", "A", "$4.00", date(2021, 10, 13)),
        ];
        let mut txns = vec![transaction("T1", "$3.00", date(2021, 10, 13))];
        let options = MatchOptions {
            max_days: 3,
            max_records_per_combination: 2,
        };

        let report = match_transactions(&mut txns, &mut charges, &options);
        assert_eq!(report.skipped_orders, vec!["A".to_string()]);
        assert!(!txns[0].is_matched());
    }

    #[test]
    fn test_matched_transactions_are_skipped() {
        let mut charges = vec![shipped("c1", "A", "$5.00", date(2021, 10, 13))];
        let mut txn = transaction("T1", "$5.00", date(2021, 10, 13));
        txn.matched = Some(TransactionMatch {
            kind: MatchKind::Refunds,
            record_ids: vec!["r1".to_string()],
        });
        let mut txns = vec![txn];

        match_transactions(&mut txns, &mut charges, &MatchOptions::default());
        assert!(!charges[0].is_matched());
    }

    #[test]
    fn test_refund_match() {
        let mut refunds = vec![refund("A", "$10.00", "$0.80")];
        let mut txns = vec![
            transaction("T1", "$10.80", date(2021, 10, 20)),
            transaction("T2", "-$10.80", date(2021, 10, 21)),
        ];

        let report = match_transactions(&mut txns, &mut refunds, &MatchOptions::default());
        assert_eq!(report.singleton_matches, 1);
        assert!(!txns[0].is_matched());
        assert_eq!(txns[1].matched.as_ref().unwrap().kind, MatchKind::Refunds);
        assert_eq!(refunds[0].matched_transaction.as_deref(), Some("T2"));
    }
}
