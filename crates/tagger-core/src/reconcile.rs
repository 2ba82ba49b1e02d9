//! # Reconciliation
//!
//! Repairs that explain small gaps between a charge's items and its billed
//! total. The merchant rounds per-item tax, shipping tax and gift wrap
//! independently from the amount it actually bills, so the parts do not
//! always add up.
//!
//! ## Repair Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      reconcile_charge()                                 │
//! │                                                                         │
//! │  reconciled? ──yes──► done                                             │
//! │     │ no                                                                │
//! │     ▼                                                                   │
//! │  1. misc charge      total > declared parts  → synthetic item          │
//! │     │                                                                   │
//! │     ▼  (still off)                                                      │
//! │  2. per-item tax     gap is tax rounding     → nudge item taxes        │
//! │     │                                                                   │
//! │     ▼  (still off)                                                      │
//! │  3. shipping tax     gap is untaxed shipping → fold into shipping      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every repair is a plain function with the same signature; each returns
//! false and leaves the charge untouched when its condition does not hold,
//! so running the pipeline on a reconciled charge changes nothing.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::money::Money;
use crate::records::{Charge, LineItem};

/// Tolerances shared by all repairs.
#[derive(Debug, Clone, Copy)]
pub struct ReconcileContext {
    pub epsilon: Money,
}

impl Default for ReconcileContext {
    fn default() -> Self {
        Self {
            epsilon: Money::EPSILON,
        }
    }
}

/// A repair rule. Returns true when it changed the charge.
pub type Heuristic = fn(&mut Charge, &ReconcileContext) -> bool;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Repair {
    MiscCharge,
    PerItemTax,
    ShippingTax,
}

impl fmt::Display for Repair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Repair::MiscCharge => write!(f, "misc_charge"),
            Repair::PerItemTax => write!(f, "per_item_tax"),
            Repair::ShippingTax => write!(f, "shipping_tax"),
        }
    }
}

/// Repairs in the order they are attempted.
pub const HEURISTICS: &[(Repair, Heuristic)] = &[
    (Repair::MiscCharge, attribute_diff_to_misc_charge),
    (Repair::PerItemTax, attribute_diff_to_per_item_tax),
    (Repair::ShippingTax, attribute_diff_to_shipping_tax),
];

/// Result of running the repair pipeline on one charge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub applied: Vec<Repair>,
    pub reconciled: bool,
}

/// Applies [`HEURISTICS`] in order until the charge is reconciled.
pub fn reconcile_charge(charge: &mut Charge, ctx: &ReconcileContext) -> ReconcileOutcome {
    let mut applied = Vec::new();
    for (repair, heuristic) in HEURISTICS {
        if charge.is_reconciled(ctx.epsilon) {
            break;
        }
        if heuristic(charge, ctx) {
            debug!(
                charge_id = %charge.id,
                order_id = %charge.order_id,
                repair = %repair,
                "Applied reconciliation repair"
            );
            applied.push(*repair);
        }
    }
    ReconcileOutcome {
        applied,
        reconciled: charge.is_reconciled(ctx.epsilon),
    }
}

// =============================================================================
// Repairs
// =============================================================================

/// Gift wrap and similar fees are billed but never itemized.
///
/// When the billed total exceeds subtotal + tax + shipping - promotions,
/// the excess becomes a "Misc Charge" item with no tax.
pub fn attribute_diff_to_misc_charge(charge: &mut Charge, ctx: &ReconcileContext) -> bool {
    let Some(template) = charge.items.first() else {
        return false;
    };
    let diff = charge.total - charge.total_by_subtotals();
    if diff < ctx.epsilon {
        return false;
    }

    let misc = LineItem::misc_charge(template, diff);
    charge.subtotal += diff;
    charge.items.push(misc);
    true
}

/// Per-item tax rounded differently from the tax actually billed.
///
/// With two or more units and a gap under one cent per unit, the gap is
/// spread evenly over the units. Otherwise, when the gap equals the
/// difference between billed tax and summed item tax, item taxes are nudged
/// a cent at a time: the lowest nonzero rate goes up on a shortfall, the
/// highest rate goes down on an excess (first item wins ties), recomputing
/// the rate after every step. A sub-cent residue lands on the first item.
pub fn attribute_diff_to_per_item_tax(charge: &mut Charge, ctx: &ReconcileContext) -> bool {
    if charge.items.is_empty() {
        return false;
    }
    let gap = charge.total - charge.total_by_items();
    if gap.abs() < ctx.epsilon {
        return false;
    }

    let quantity = charge.total_quantity();
    if quantity >= 2 && gap.abs() < Money::CENT * quantity {
        spread_over_units(&mut charge.items, gap);
        return true;
    }

    let mut tax_diff = charge.tax - LineItem::sum_taxes(&charge.items);
    if !gap.nearly_equal_within(tax_diff, ctx.epsilon) {
        return false;
    }

    let mut items = charge.items.clone();
    let mut rates: Vec<i64> = items.iter().map(tax_rate_per_mille).collect();
    while tax_diff.abs() >= ctx.epsilon {
        let (index, adjustment) = if tax_diff.abs() < Money::CENT {
            (0, tax_diff)
        } else if tax_diff.is_positive() {
            match lowest_nonzero_rate(&rates) {
                Some(index) => (index, Money::CENT),
                None => return false,
            }
        } else {
            (highest_rate(&rates), -Money::CENT)
        };

        items[index].tax += adjustment;
        items[index].total += adjustment;
        tax_diff -= adjustment;
        rates[index] = tax_rate_per_mille(&items[index]);
    }

    charge.items = items;
    true
}

/// Shipping was taxed but the tax was reported with the items.
///
/// When shipping is nonzero and the items fall short of the total by no
/// more than the billed tax, the shortfall moves from tax into shipping.
pub fn attribute_diff_to_shipping_tax(charge: &mut Charge, ctx: &ReconcileContext) -> bool {
    if charge.shipping.is_zero() {
        return false;
    }
    let diff = charge.total - charge.total_by_items();
    if diff < ctx.epsilon || diff > charge.tax {
        return false;
    }

    charge.shipping += diff;
    charge.tax -= diff;
    charge.tax_before_promotions -= diff;
    true
}

// =============================================================================
// Helpers
// =============================================================================

fn spread_over_units(items: &mut [LineItem], gap: Money) {
    let units: usize = items.iter().map(|i| i.quantity as usize).sum();
    let mut shares = gap.split_evenly(units).into_iter();
    for item in items.iter_mut() {
        let share: Money = shares.by_ref().take(item.quantity as usize).sum();
        item.tax += share;
        item.total += share;
    }
}

/// Tax as a fraction of subtotal, in tenths of a percent, rounded.
fn tax_rate_per_mille(item: &LineItem) -> i64 {
    let subtotal = i128::from(item.subtotal.micros());
    if subtotal == 0 {
        return 0;
    }
    let doubled = i128::from(item.tax.micros()) * 2000 / subtotal;
    ((doubled + doubled.signum()) / 2) as i64
}

fn lowest_nonzero_rate(rates: &[i64]) -> Option<usize> {
    rates
        .iter()
        .enumerate()
        .filter(|(_, rate)| **rate != 0)
        .min_by_key(|(_, rate)| **rate)
        .map(|(index, _)| index)
}

fn highest_rate(rates: &[i64]) -> usize {
    let mut best = 0;
    for (index, rate) in rates.iter().enumerate() {
        if *rate > rates[best] {
            best = index;
        }
    }
    best
}

// =============================================================================
// Unit Tests
// =============================================================================
