//! # Tagging Run
//!
//! One pass from decoded reports and ledger to proposed ledger updates.
//!
//! ## Stages
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  items ──► drop unshipped ──► split by quantity ──┐                    │
//! │                                                   ▼                    │
//! │  charges ─────────────────────────────────► associate_items            │
//! │                                                   │                    │
//! │                                   delivery fee ◄──┘                    │
//! │                                        │                               │
//! │                                        ▼                               │
//! │                                 reconcile_charge ──► unreconciled      │
//! │                                        │            (reported, kept    │
//! │                                        │             out of matching)  │
//! │  ledger ──► unsplit ──► filter ──► match charges ──► match refunds     │
//! │                                                           │            │
//! │                                                           ▼            │
//! │                             itemize / summarize ──► classify ──► out   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Data-quality problems (unmatched records, unexplained gaps, timeouts)
//! land in [`RunStats`]; only a broken invariant aborts the run.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::association::{associate_items, AssociationOptions};
use crate::category::CategoryMapper;
use crate::config::TaggerConfig;
use crate::error::{TaggerError, TaggerResult};
use crate::history::CategoryHistory;
use crate::itemizer::{itemize, verify_sum, Itemizer, PurchasedCodes, NON_ITEM_DESCRIPTIONS};
use crate::matcher::{match_transactions, MatchOptions};
use crate::reconcile::{reconcile_charge, ReconcileContext, Repair};
use crate::records::{
    Charge, EntryKey, LedgerTransaction, LineItem, MatchKind, Refund, ReplacementEntry,
};

// =============================================================================
// Input & Output
// =============================================================================

/// Everything one run reads.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunInput {
    pub items: Vec<LineItem>,
    pub charges: Vec<Charge>,
    #[serde(default)]
    pub refunds: Vec<Refund>,
    pub transactions: Vec<LedgerTransaction>,
}

/// How a proposed update relates to what the ledger already shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagStatus {
    /// Never tagged before.
    New,
    /// Tagged by an earlier run and changed since.
    Retag,
    /// Tagged by an earlier run; left alone unless retagging is enabled.
    AlreadyTagged,
    /// The ledger already shows exactly these entries.
    UpToDate,
}

/// Entries that should replace (or split) one ledger transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposedUpdate {
    pub transaction: LedgerTransaction,
    pub entries: Vec<ReplacementEntry>,
    pub status: TagStatus,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunOutput {
    /// Only `New` and `Retag` updates are emitted.
    pub updates: Vec<ProposedUpdate>,
    pub unmatched_charges: Vec<Charge>,
    pub unmatched_refunds: Vec<Refund>,
    pub unmatched_transactions: Vec<LedgerTransaction>,
    pub stats: RunStats,
}

/// Counters reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub transactions_considered: usize,
    pub merchant_transactions: usize,
    pub pending_skipped: usize,

    pub charges_matched: usize,
    pub charges_unmatched: usize,
    pub refunds_matched: usize,
    pub refunds_unmatched: usize,
    pub transactions_matched: usize,
    pub transactions_unmatched: usize,

    pub orders_skipped_subtotal_mismatch: usize,
    pub partition_timeouts: usize,
    pub combination_orders_skipped: usize,

    pub misc_charges: usize,
    pub shipping_tax_repairs: usize,
    pub per_item_tax_repairs: usize,
    pub unreconciled_charges: usize,

    pub new_tags: usize,
    pub retags: usize,
    pub already_tagged: usize,
    pub already_up_to_date: usize,
    pub personal_category: usize,

    /// Unmatched charges that never shipped.
    pub unshipped_charges: usize,
    /// Unmatched charges paid by gift card.
    pub gift_card_charges: usize,
}

impl RunStats {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    fn record_repair(&mut self, repair: Repair) {
        match repair {
            Repair::MiscCharge => self.misc_charges += 1,
            Repair::PerItemTax => self.per_item_tax_repairs += 1,
            Repair::ShippingTax => self.shipping_tax_repairs += 1,
        }
    }
}

// =============================================================================
// Run
// =============================================================================

/// Runs association, reconciliation, matching and itemization.
pub fn run(input: RunInput, config: &TaggerConfig) -> TaggerResult<RunOutput> {
    config.validate()?;
    ensure_unique_ids("charge", input.charges.iter().map(|c| c.id.as_str()))?;
    ensure_unique_ids("refund", input.refunds.iter().map(|r| r.id.as_str()))?;
    let epsilon = config.epsilon();
    let settings = &config.itemize;
    let mut stats = RunStats::default();

    let categories = CategoryMapper::new(&config.categories);
    let fee_description = config.delivery_fee.as_ref().map(|f| f.description.as_str());
    let itemizer = Itemizer::new(
        &categories,
        epsilon,
        settings.suppress_free_shipping,
        fee_description,
    );
    let tagged_prefixes = tagged_prefixes(config);

    let history = config.categories.predict.then(|| {
        CategoryHistory::learn(
            &input.transactions,
            &tagged_prefixes,
            categories.default_category(),
            &NON_ITEM_DESCRIPTIONS,
        )
    });

    // Items.
    let purchased: PurchasedCodes = input
        .items
        .iter()
        .map(|i| ((i.title.clone(), i.order_id.clone()), i.category_code))
        .collect();
    let items: Vec<LineItem> = input
        .items
        .into_iter()
        .filter(|i| !i.is_cancelled() && i.is_shipped() && i.quantity > 0)
        .flat_map(LineItem::split_by_quantity)
        .collect();

    // Charges.
    let mut charges = input.charges;
    let association = associate_items(
        &mut charges,
        items,
        &AssociationOptions {
            epsilon,
            timeout: config.partition_timeout(),
        },
    )?;
    stats.orders_skipped_subtotal_mismatch = association.skipped_orders.len();
    stats.partition_timeouts = association.timed_out_orders.len();

    let (mut charges, mut unmatched_charges): (Vec<Charge>, Vec<Charge>) =
        charges.into_iter().partition(Charge::has_items);

    if let Some(fee) = &config.delivery_fee {
        for charge in &mut charges {
            if charge.apply_delivery_fee(fee) {
                debug!(charge_id = %charge.id, fee = %fee.amount, "Charge owes delivery fee");
            }
        }
    }

    let ctx = ReconcileContext { epsilon };
    let mut reconciled = Vec::with_capacity(charges.len());
    for mut charge in charges {
        let outcome = reconcile_charge(&mut charge, &ctx);
        for repair in &outcome.applied {
            stats.record_repair(*repair);
        }
        if outcome.reconciled {
            reconciled.push(charge);
        } else {
            warn!(
                charge_id = %charge.id,
                order_id = %charge.order_id,
                billed = %charge.total,
                by_items = %charge.total_by_items(),
                "Charge does not reconcile with its items"
            );
            stats.unreconciled_charges += 1;
            unmatched_charges.push(charge);
        }
    }
    let mut charges = reconciled;

    // Ledger.
    let ledger = LedgerTransaction::unsplit(input.transactions);
    stats.transactions_considered = ledger.len();
    let mut transactions = Vec::new();
    for t in ledger {
        if !mentions_merchant(&t, &config.ledger.merchant_keywords) {
            continue;
        }
        stats.merchant_transactions += 1;
        if t.is_pending {
            stats.pending_skipped += 1;
            continue;
        }
        if let Some(filter) = &config.ledger.category_filter {
            if !filter.contains(&t.category) {
                continue;
            }
        }
        transactions.push(t);
    }

    // Matching.
    let options = MatchOptions {
        max_days: config.matching.max_days_between_payment_and_shipping,
        max_records_per_combination: config.matching.max_charges_per_combination,
    };
    let charge_report = match_transactions(&mut transactions, &mut charges, &options);
    let mut refunds = input.refunds;
    let refund_report = match_transactions(&mut transactions, &mut refunds, &options);
    stats.combination_orders_skipped =
        charge_report.skipped_orders.len() + refund_report.skipped_orders.len();

    // Itemization.
    let charges_by_id: HashMap<&str, &Charge> =
        charges.iter().map(|c| (c.id.as_str(), c)).collect();
    let refunds_by_id: HashMap<&str, &Refund> =
        refunds.iter().map(|r| (r.id.as_str(), r)).collect();

    let mut updates = Vec::new();
    for t in &transactions {
        let Some(matched) = &t.matched else {
            continue;
        };

        let (mut entries, summarize, prefix) = match matched.kind {
            MatchKind::Charges => {
                let records: Vec<Charge> = matched
                    .record_ids
                    .iter()
                    .filter_map(|id| charges_by_id.get(id.as_str()).map(|c| (*c).clone()))
                    .collect();
                let entries = itemizer.charge_entries(t, &records)?;
                let item_count = Charge::merge(&records).map_or(0, |c| c.items.len());
                let summarize =
                    settings.summarize || (item_count == 1 && !settings.force_itemize);
                let website = website_of(records.first().map(|c| c.website.as_str()));
                let prefix = settings
                    .description_prefix
                    .clone()
                    .unwrap_or_else(|| format!("{}: ", website));
                (entries, summarize, prefix)
            }
            MatchKind::Refunds => {
                let records: Vec<Refund> = matched
                    .record_ids
                    .iter()
                    .filter_map(|id| refunds_by_id.get(id.as_str()).map(|r| (*r).clone()))
                    .collect();
                let entries = itemizer.refund_entries(t, &records, &purchased);
                let website = website_of(records.first().map(|r| r.website.as_str()));
                let prefix = settings
                    .refund_prefix
                    .clone()
                    .unwrap_or_else(|| format!("{} refund: ", website));
                (entries, settings.summarize, prefix)
            }
        };

        verify_sum(t, &entries, epsilon)?;

        if let Some(history) = &history {
            for entry in entries.iter_mut() {
                if itemizer.is_non_item(&entry.description) {
                    continue;
                }
                if let Some(category) = history.category_for(&entry.description) {
                    if category != entry.category {
                        entry.category = category.to_string();
                        stats.personal_category += 1;
                    }
                }
            }
        }

        let entries = if summarize {
            vec![itemizer.summarize(t, &entries, &prefix)]
        } else {
            itemize(entries, &prefix)
        };

        let status = classify(t, &entries, &tagged_prefixes, config);
        debug!(transaction_id = %t.id, status = ?status, entries = entries.len(), "Classified update");
        match status {
            TagStatus::New => stats.new_tags += 1,
            TagStatus::Retag => stats.retags += 1,
            TagStatus::AlreadyTagged => stats.already_tagged += 1,
            TagStatus::UpToDate => stats.already_up_to_date += 1,
        }
        if matches!(status, TagStatus::New | TagStatus::Retag) {
            updates.push(ProposedUpdate {
                transaction: t.clone(),
                entries,
                status,
            });
        }
    }

    if settings.max_updates > 0 && updates.len() > settings.max_updates {
        info!(
            proposed = updates.len(),
            max_updates = settings.max_updates,
            "Truncating proposed updates"
        );
        updates.truncate(settings.max_updates);
    }

    // Leftovers.
    let (matched_charges, unmatched): (Vec<Charge>, Vec<Charge>) =
        charges.into_iter().partition(Charge::is_matched);
    unmatched_charges.extend(unmatched);
    let (matched_refunds, unmatched_refunds): (Vec<Refund>, Vec<Refund>) =
        refunds.into_iter().partition(Refund::is_matched);
    let (matched_transactions, unmatched_transactions): (Vec<_>, Vec<_>) =
        transactions.into_iter().partition(LedgerTransaction::is_matched);

    stats.charges_matched = matched_charges.len();
    stats.charges_unmatched = unmatched_charges.len();
    stats.refunds_matched = matched_refunds.len();
    stats.refunds_unmatched = unmatched_refunds.len();
    stats.transactions_matched = matched_transactions.len();
    stats.transactions_unmatched = unmatched_transactions.len();
    stats.unshipped_charges = unmatched_charges
        .iter()
        .filter(|c| c.ship_date.is_none())
        .count();
    stats.gift_card_charges = unmatched_charges.iter().filter(|c| c.is_gift_card()).count();

    info!(
        transactions = stats.merchant_transactions,
        matched = stats.transactions_matched,
        charges_matched = stats.charges_matched,
        charges_unmatched = stats.charges_unmatched,
        refunds_matched = stats.refunds_matched,
        updates = updates.len(),
        "Tagging run complete"
    );

    Ok(RunOutput {
        updates,
        unmatched_charges,
        unmatched_refunds,
        unmatched_transactions,
        stats,
    })
}

// =============================================================================
// Helpers
// =============================================================================

/// Lowercase description prefixes an earlier run would have written.
fn tagged_prefixes(config: &TaggerConfig) -> Vec<String> {
    let mut prefixes: Vec<String> = config
        .ledger
        .merchant_prefixes
        .iter()
        .flat_map(|p| {
            let p = p.to_lowercase();
            [format!("{}: ", p), format!("{} refund: ", p)]
        })
        .collect();
    for custom in [&config.itemize.description_prefix, &config.itemize.refund_prefix]
        .into_iter()
        .flatten()
    {
        prefixes.push(custom.to_lowercase());
    }
    prefixes
}

/// Matched records are looked up by id after matching.
fn ensure_unique_ids<'a>(
    kind: &'static str,
    ids: impl Iterator<Item = &'a str>,
) -> TaggerResult<()> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(TaggerError::DuplicateRecordId {
                kind,
                record_id: id.to_string(),
            });
        }
    }
    Ok(())
}

fn mentions_merchant(t: &LedgerTransaction, keywords: &[String]) -> bool {
    let original = t.original_description.to_lowercase();
    let current = t.description.to_lowercase();
    keywords.iter().any(|k| {
        let k = k.to_lowercase();
        original.contains(&k) || current.contains(&k)
    })
}

fn website_of(website: Option<&str>) -> &str {
    match website {
        Some(w) if !w.trim().is_empty() => w,
        _ => "Amazon.com",
    }
}

fn classify(
    transaction: &LedgerTransaction,
    entries: &[ReplacementEntry],
    tagged_prefixes: &[String],
    config: &TaggerConfig,
) -> TagStatus {
    let ignore_category = config.itemize.ignore_category;
    let current: BTreeSet<EntryKey> = transaction.current_keys(ignore_category).into_iter().collect();
    let proposed: BTreeSet<EntryKey> = entries.iter().map(|e| e.key(ignore_category)).collect();
    if current == proposed {
        return TagStatus::UpToDate;
    }

    let description = transaction.description.to_lowercase();
    if tagged_prefixes.iter().any(|p| description.starts_with(p.as_str())) {
        if config.itemize.retag_changed {
            TagStatus::Retag
        } else {
            TagStatus::AlreadyTagged
        }
    } else {
        TagStatus::New
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
