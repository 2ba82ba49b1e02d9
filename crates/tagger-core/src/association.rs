//! # Item Association
//!
//! Assigns line items to the charges of their order.
//!
//! ## Per-Order Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       associate_items()                                 │
//! │                                                                         │
//! │  items + charges grouped by order id                                   │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  Σ item subtotals ≈ Σ charge subtotals ? ── no ──► skip order          │
//! │     │ yes                                                               │
//! │     ▼                                                                   │
//! │  one charge? ── yes ──► it owns every item                             │
//! │     │ no                                                                │
//! │     ▼                                                                   │
//! │  tracking: items sharing a charge's tracking id, when their subtotal   │
//! │  equals the charge subtotal, go to that charge                         │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  partition search over the leftover items, k = charges still empty,    │
//! │  bounded by a wall-clock budget                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Assignment is monotonic: once a charge owns items it is never revisited,
//! and an item is handed to at most one charge. Orders that cannot be
//! resolved are reported, not treated as errors.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::error::TaggerResult;
use crate::money::Money;
use crate::partition::partitions;
use crate::records::{Charge, LineItem};

/// Tolerances for association.
#[derive(Debug, Clone, Copy)]
pub struct AssociationOptions {
    pub epsilon: Money,
    /// Budget for the partition search of a single order.
    pub timeout: Duration,
}

impl Default for AssociationOptions {
    fn default() -> Self {
        Self {
            epsilon: Money::EPSILON,
            timeout: Duration::from_secs(1),
        }
    }
}

/// What happened during association.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociationReport {
    /// Orders whose item subtotals disagree with their charges.
    pub skipped_orders: Vec<String>,
    /// Orders whose partition search ran out of time.
    pub timed_out_orders: Vec<String>,
    pub charges_by_single: usize,
    pub charges_by_tracking: usize,
    pub charges_by_partition: usize,
}

/// Assigns `items` to `charges`.
///
/// Items whose order has no charge, and items left over after every charge
/// of their order is filled, stay unassigned.
pub fn associate_items(
    charges: &mut [Charge],
    items: Vec<LineItem>,
    options: &AssociationOptions,
) -> TaggerResult<AssociationReport> {
    let mut report = AssociationReport::default();

    let mut items_by_order: BTreeMap<String, Vec<LineItem>> = BTreeMap::new();
    for item in items {
        items_by_order
            .entry(item.order_id.clone())
            .or_default()
            .push(item);
    }

    let mut charges_by_order: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (index, charge) in charges.iter().enumerate() {
        charges_by_order
            .entry(charge.order_id.clone())
            .or_default()
            .push(index);
    }

    for (order_id, charge_indices) in charges_by_order {
        let order_items = items_by_order.remove(&order_id).unwrap_or_default();
        associate_order(
            &order_id,
            charges,
            &charge_indices,
            order_items,
            options,
            &mut report,
        )?;
    }

    Ok(report)
}

fn associate_order(
    order_id: &str,
    charges: &mut [Charge],
    charge_indices: &[usize],
    items: Vec<LineItem>,
    options: &AssociationOptions,
    report: &mut AssociationReport,
) -> TaggerResult<()> {
    let item_subtotal = LineItem::sum_subtotals(&items);
    let charge_subtotal: Money = charge_indices.iter().map(|&i| charges[i].subtotal).sum();
    if !item_subtotal.nearly_equal_within(charge_subtotal, options.epsilon) {
        debug!(
            order_id = %order_id,
            items = %item_subtotal,
            charges = %charge_subtotal,
            "Order subtotals disagree, skipping"
        );
        report.skipped_orders.push(order_id.to_string());
        return Ok(());
    }

    if let [only] = charge_indices {
        charges[*only].set_items(items)?;
        report.charges_by_single += 1;
        return Ok(());
    }

    // Tracking id correlation.
    let mut pool = items;
    for &index in charge_indices {
        let tracking = charges[index].tracking.clone();
        if tracking.is_empty() {
            continue;
        }
        let shares_tracking = |item: &LineItem| item.tracking == tracking;
        if !pool.iter().any(shares_tracking) {
            continue;
        }
        let shared_subtotal: Money = pool
            .iter()
            .filter(|item| shares_tracking(item))
            .map(|item| item.subtotal)
            .sum();
        if !shared_subtotal.nearly_equal_within(charges[index].subtotal, options.epsilon) {
            continue;
        }

        let (shared, rest): (Vec<LineItem>, Vec<LineItem>) =
            pool.into_iter().partition(|item| shares_tracking(item));
        debug!(
            order_id = %order_id,
            charge_id = %charges[index].id,
            items = shared.len(),
            "Assigned by tracking"
        );
        charges[index].set_items(shared)?;
        report.charges_by_tracking += 1;
        pool = rest;
    }

    let mut remaining: Vec<usize> = charge_indices
        .iter()
        .copied()
        .filter(|&i| !charges[i].has_items())
        .collect();
    if remaining.is_empty() || pool.is_empty() {
        return Ok(());
    }
    remaining.sort_by_key(|&i| charges[i].subtotal);

    match search_partition(&pool, &remaining, charges, options) {
        Search::Found(groups) => {
            let mut slots: Vec<Option<LineItem>> = pool.into_iter().map(Some).collect();
            for (charge_index, group) in remaining.iter().zip(groups) {
                let assigned: Vec<LineItem> =
                    group.iter().filter_map(|&i| slots[i].take()).collect();
                charges[*charge_index].set_items(assigned)?;
                report.charges_by_partition += 1;
            }
            debug!(order_id = %order_id, charges = remaining.len(), "Assigned by partition search");
        }
        Search::TimedOut => {
            warn!(
                order_id = %order_id,
                items = pool.len(),
                charges = remaining.len(),
                "Partition search timed out; order left unassigned"
            );
            report.timed_out_orders.push(order_id.to_string());
        }
        Search::Exhausted => {
            debug!(order_id = %order_id, "No item grouping reproduces the charge subtotals");
        }
    }
    Ok(())
}

enum Search {
    /// Item index groups, aligned with the sorted charges.
    Found(Vec<Vec<usize>>),
    TimedOut,
    Exhausted,
}

fn search_partition(
    pool: &[LineItem],
    sorted_charges: &[usize],
    charges: &[Charge],
    options: &AssociationOptions,
) -> Search {
    let indices: Vec<usize> = (0..pool.len()).collect();
    let start = Instant::now();

    for groups in partitions(&indices, sorted_charges.len()) {
        if start.elapsed() >= options.timeout {
            return Search::TimedOut;
        }

        let mut candidates: Vec<(Money, Vec<usize>)> = groups
            .into_iter()
            .map(|group| {
                let sum = group.iter().map(|&&i| pool[i].subtotal).sum();
                (sum, group.into_iter().copied().collect())
            })
            .collect();
        candidates.sort_by_key(|(sum, _)| *sum);

        let matches = candidates
            .iter()
            .zip(sorted_charges)
            .all(|((sum, _), &c)| sum.nearly_equal_within(charges[c].subtotal, options.epsilon));
        if matches {
            return Search::Found(candidates.into_iter().map(|(_, g)| g).collect());
        }
    }
    Search::Exhausted
}

// =============================================================================
// Unit Tests
// =============================================================================
