//! # tagger-core: Order Reconciliation Engine
//!
//! Matches merchant orders against the entries of a personal ledger and
//! proposes itemized replacements for the matched entries. Every function
//! is pure: reports come in decoded, updates go out as values.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Order Tagger                                     │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │   Report decoding (caller)       Ledger export (caller)         │   │
//! │  │   items / orders / refunds       transactions                   │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ rows ──► records                       │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ tagger-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌────────────┐  ┌────────────┐  ┌────────────┐  ┌──────────┐ │   │
//! │  │   │ association│  │ reconcile  │  │  matcher   │  │ itemizer │ │   │
//! │  │   │ partition  │  │ heuristics │  │ Pass A / B │  │ category │ │   │
//! │  │   └────────────┘  └────────────┘  └────────────┘  └──────────┘ │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO NETWORK • INTEGER MONEY                          │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ ProposedUpdate + RunStats              │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 Ledger sender (caller)                          │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`money`] - Fixed-point currency (micro-units, no floating point)
//! - [`records`] - Line items, charges, refunds, ledger transactions
//! - [`rows`] - Report rows and their conversion into records
//! - [`partition`] - Set-partition enumeration
//! - [`association`] - Assigns line items to the charges that billed them
//! - [`reconcile`] - Repairs for charges whose items don't add up
//! - [`matcher`] - Pairs ledger transactions with charges or refunds
//! - [`category`] - Catalog code to ledger category
//! - [`history`] - Categories the user picked on earlier runs
//! - [`itemizer`] - Replacement entries for a matched transaction
//! - [`pipeline`] - A whole tagging run
//! - [`config`], [`error`], [`validation`], [`title`]
//!
//! ## Example Usage
//!
//! ```rust
//! use tagger_core::money::Money;
//!
//! let subtotal = Money::parse("$10.90").unwrap();
//! let tax = Money::parse("$1.05").unwrap();
//! assert_eq!((subtotal + tax).to_string(), "$11.95");
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod association;
pub mod category;
pub mod config;
pub mod error;
pub mod history;
pub mod itemizer;
pub mod matcher;
pub mod money;
pub mod partition;
pub mod pipeline;
pub mod reconcile;
pub mod records;
pub mod rows;
pub mod title;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use config::TaggerConfig;
pub use error::{ConfigError, TaggerError, TaggerResult, ValidationError};
pub use money::Money;
pub use pipeline::{run, ProposedUpdate, RunInput, RunOutput, RunStats, TagStatus};
pub use records::{Charge, LedgerTransaction, LineItem, Refund, ReplacementEntry};

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Largest quantity accepted on a single report row.
pub const MAX_ITEM_QUANTITY: i64 = 999;

// =============================================================================
// Test Fixtures
// =============================================================================

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::NaiveDate;

    use crate::money::Money;
    use crate::records::{Charge, ItemStatus, LedgerTransaction, LineItem, Refund};

    pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn money(s: &str) -> Money {
        Money::parse(s).unwrap()
    }

    /// A shipped, untaxed single unit of "Duracell AAs".
    pub fn item(order_id: &str, subtotal: &str) -> LineItem {
        let subtotal = money(subtotal);
        LineItem {
            order_id: order_id.to_string(),
            title: "Duracell AAs".to_string(),
            product_id: "B00009V2QX".to_string(),
            category_code: None,
            quantity: 1,
            unit_price: subtotal,
            subtotal,
            tax: Money::zero(),
            total: subtotal,
            tracking: String::new(),
            order_date: Some(date(2021, 10, 10)),
            ship_date: Some(date(2021, 10, 13)),
            status: ItemStatus::Shipped,
            website: "Amazon.com".to_string(),
        }
    }

    /// First charge of `order_id`, no tax, shipping or promotions.
    pub fn charge(order_id: &str, subtotal: &str, total: &str) -> Charge {
        Charge {
            id: format!("{}-1", order_id),
            order_id: order_id.to_string(),
            order_date: Some(date(2021, 10, 10)),
            ship_date: Some(date(2021, 10, 13)),
            tracking: String::new(),
            ship_address: String::new(),
            payment_instrument: "Visa".to_string(),
            website: "Amazon.com".to_string(),
            subtotal: money(subtotal),
            shipping: Money::zero(),
            promotions: Money::zero(),
            tax_before_promotions: Money::zero(),
            tax: Money::zero(),
            total: money(total),
            delivery_fee: None,
            items: Vec::new(),
            matched_transaction: None,
        }
    }

    pub fn refund(order_id: &str, amount: &str, tax: &str) -> Refund {
        Refund {
            id: format!("{}-R1", order_id),
            order_id: order_id.to_string(),
            title: "Duracell AAs".to_string(),
            product_id: "B00009V2QX".to_string(),
            quantity: 1,
            amount: money(amount),
            tax: money(tax),
            order_date: Some(date(2021, 10, 10)),
            refund_date: Some(date(2021, 10, 20)),
            reason: "Customer Return".to_string(),
            website: "Amazon.com".to_string(),
            matched_transaction: None,
        }
    }

    pub fn transaction(id: &str, amount: &str, date: NaiveDate) -> LedgerTransaction {
        LedgerTransaction {
            id: id.to_string(),
            date,
            original_date: None,
            description: "AMAZON MKTPLACE PMTS".to_string(),
            original_description: "AMAZON MKTPLACE PMTS".to_string(),
            amount: money(amount),
            category: "Shopping".to_string(),
            note: String::new(),
            is_pending: false,
            parent_id: None,
            children: Vec::new(),
            matched: None,
        }
    }

    /// Routes events to the test harness; `RUST_LOG` picks the level.
    pub fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }
}
