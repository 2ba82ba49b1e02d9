//! # Tagger Configuration
//!
//! Numeric and boolean knobs consumed by a reconciliation run.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Flow                                   │
//! │                                                                         │
//! │  Caller (CLI, desktop shell, test)                                     │
//! │     │  owns file paths and flags                                       │
//! │     ▼                                                                   │
//! │  TOML text ──► TaggerConfig::from_toml_str() ──► validate()            │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  pipeline::run(input, &config)                                          │
//! │                                                                         │
//! │  Missing sections and fields fall back to defaults.                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [matching]
//! max_days_between_payment_and_shipping = 3
//! max_charges_per_combination = 8
//! partition_timeout_ms = 1000
//!
//! [itemize]
//! summarize = false
//! force_itemize = false
//! suppress_free_shipping = true
//! retag_changed = false
//! max_updates = 0
//!
//! [categories]
//! predict = true
//! default_category = "Shopping"
//!
//! [categories.remap]
//! "43211617" = "Electronics & Software"
//!
//! [ledger]
//! merchant_keywords = ["amazon"]
//! merchant_prefixes = ["amazon.com"]
//!
//! [currency]
//! epsilon_micros = 50
//!
//! [delivery_fee]
//! region_marker = " CO "
//! amount = 270000
//! effective_from = "2022-07-01"
//! ```

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

use crate::error::ConfigError;
use crate::money::{Money, EPSILON_MICROS, MICROS_PER_CENT};

/// Upper bound for `max_charges_per_combination`; 2^16 subsets per order.
pub const MAX_COMBINATION_BOUND: usize = 16;

// =============================================================================
// Matching Settings
// =============================================================================

/// Transaction matching and association search bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingSettings {
    /// Maximum day gap between a ledger posting and the ship/refund date.
    #[serde(default = "default_max_days")]
    pub max_days_between_payment_and_shipping: i64,

    /// Orders with more unmatched charges than this skip combinatorial
    /// matching entirely.
    #[serde(default = "default_max_charges_per_combination")]
    pub max_charges_per_combination: usize,

    /// Wall-clock budget for the partition search of one order (ms).
    #[serde(default = "default_partition_timeout_ms")]
    pub partition_timeout_ms: u64,
}

fn default_max_days() -> i64 {
    3
}

fn default_max_charges_per_combination() -> usize {
    8
}

fn default_partition_timeout_ms() -> u64 {
    1000
}

impl Default for MatchingSettings {
    fn default() -> Self {
        MatchingSettings {
            max_days_between_payment_and_shipping: default_max_days(),
            max_charges_per_combination: default_max_charges_per_combination(),
            partition_timeout_ms: default_partition_timeout_ms(),
        }
    }
}

// =============================================================================
// Itemize Settings
// =============================================================================

/// How replacement entries are produced and which ones are proposed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemizeSettings {
    /// Always collapse entries into one summary entry.
    #[serde(default)]
    pub summarize: bool,

    /// Itemize even single-item charges.
    #[serde(default)]
    pub force_itemize: bool,

    /// Omit shipping and the promotion that cancels it.
    #[serde(default = "default_true")]
    pub suppress_free_shipping: bool,

    /// Replaces the "<website>: " description prefix.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description_prefix: Option<String>,

    /// Replaces the "<website> refund: " description prefix.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refund_prefix: Option<String>,

    /// Propose updates for transactions that were tagged before.
    #[serde(default)]
    pub retag_changed: bool,

    /// Leave categories out when comparing old and new entries.
    #[serde(default)]
    pub ignore_category: bool,

    /// Maximum proposed updates; 0 means unlimited.
    #[serde(default)]
    pub max_updates: usize,
}

fn default_true() -> bool {
    true
}

impl Default for ItemizeSettings {
    fn default() -> Self {
        ItemizeSettings {
            summarize: false,
            force_itemize: false,
            suppress_free_shipping: true,
            description_prefix: None,
            refund_prefix: None,
            retag_changed: false,
            ignore_category: false,
            max_updates: 0,
        }
    }
}

// =============================================================================
// Category Settings
// =============================================================================

/// Category names and the catalog-code remap table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorySettings {
    /// Learn item categories from previously tagged transactions.
    #[serde(default = "default_true", alias = "predict_categories")]
    pub predict: bool,

    #[serde(default = "default_category")]
    pub default_category: String,

    #[serde(default = "default_shipping_category")]
    pub shipping_category: String,

    #[serde(default = "default_returns_category")]
    pub returns_category: String,

    /// Catalog code → category overrides, checked before the built-in tree.
    #[serde(default)]
    pub remap: BTreeMap<String, String>,
}

fn default_category() -> String {
    "Shopping".to_string()
}

fn default_shipping_category() -> String {
    "Shipping".to_string()
}

fn default_returns_category() -> String {
    "Returned Purchase".to_string()
}

impl Default for CategorySettings {
    fn default() -> Self {
        CategorySettings {
            predict: true,
            default_category: default_category(),
            shipping_category: default_shipping_category(),
            returns_category: default_returns_category(),
            remap: BTreeMap::new(),
        }
    }
}

// =============================================================================
// Ledger Settings
// =============================================================================

/// Which ledger transactions are considered at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSettings {
    /// A transaction is considered when its original or current description
    /// contains one of these (case-insensitive).
    #[serde(default = "default_merchant_keywords")]
    pub merchant_keywords: Vec<String>,

    /// Descriptions starting with one of these were tagged by a prior run.
    #[serde(default = "default_merchant_prefixes")]
    pub merchant_prefixes: Vec<String>,

    /// When set, only transactions in these categories are considered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_filter: Option<Vec<String>>,
}

fn default_merchant_keywords() -> Vec<String> {
    vec!["amazon".to_string()]
}

fn default_merchant_prefixes() -> Vec<String> {
    vec!["amazon.com".to_string()]
}

impl Default for LedgerSettings {
    fn default() -> Self {
        LedgerSettings {
            merchant_keywords: default_merchant_keywords(),
            merchant_prefixes: default_merchant_prefixes(),
            category_filter: None,
        }
    }
}

// =============================================================================
// Currency Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrencySettings {
    /// Tolerance for nearly-equal comparisons, in micro-units.
    #[serde(default = "default_epsilon_micros")]
    pub epsilon_micros: i64,
}

fn default_epsilon_micros() -> i64 {
    EPSILON_MICROS
}

impl Default for CurrencySettings {
    fn default() -> Self {
        CurrencySettings {
            epsilon_micros: default_epsilon_micros(),
        }
    }
}

// =============================================================================
// Delivery Fee Settings
// =============================================================================

/// A per-delivery regional fee that the merchant bills but never itemizes.
///
/// ## When It Applies
/// ```text
/// ship address contains region_marker ─┐
/// charge has nonzero tax ──────────────┼──► transact amount = total + fee
/// ship date >= effective_from ─────────┘    (rounded to the cent)
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryFeeSettings {
    pub region_marker: String,

    /// Fee in micro-units.
    pub amount: Money,

    pub effective_from: NaiveDate,

    /// Description of the generated fee entry.
    #[serde(default = "default_fee_description")]
    pub description: String,
}

fn default_fee_description() -> String {
    "Retail Delivery Fee".to_string()
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete tagger configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaggerConfig {
    #[serde(default)]
    pub matching: MatchingSettings,

    #[serde(default)]
    pub itemize: ItemizeSettings,

    #[serde(default)]
    pub categories: CategorySettings,

    #[serde(default)]
    pub ledger: LedgerSettings,

    #[serde(default)]
    pub currency: CurrencySettings,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_fee: Option<DeliveryFeeSettings>,
}

impl TaggerConfig {
    /// Parses and validates configuration from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: TaggerConfig = toml::from_str(contents)?;
        config.validate()?;
        debug!(
            max_days = config.matching.max_days_between_payment_and_shipping,
            summarize = config.itemize.summarize,
            "Loaded tagger config"
        );
        Ok(config)
    }

    /// Renders the configuration as TOML.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.matching.max_days_between_payment_and_shipping < 0 {
            return Err(invalid(
                "matching.max_days_between_payment_and_shipping",
                "must not be negative",
            ));
        }

        let bound = self.matching.max_charges_per_combination;
        if !(2..=MAX_COMBINATION_BOUND).contains(&bound) {
            return Err(invalid(
                "matching.max_charges_per_combination",
                &format!("must be between 2 and {}", MAX_COMBINATION_BOUND),
            ));
        }

        if self.matching.partition_timeout_ms == 0 {
            return Err(invalid("matching.partition_timeout_ms", "must be greater than 0"));
        }

        if self.summarize_conflicts() {
            return Err(invalid(
                "itemize.force_itemize",
                "cannot be combined with itemize.summarize",
            ));
        }

        let categories = &self.categories;
        for (field, name) in [
            ("categories.default_category", &categories.default_category),
            ("categories.shipping_category", &categories.shipping_category),
            ("categories.returns_category", &categories.returns_category),
        ] {
            if name.trim().is_empty() {
                return Err(invalid(field, "must not be empty"));
            }
        }

        for code in categories.remap.keys() {
            if code.parse::<u64>().is_err() {
                return Err(invalid(
                    "categories.remap",
                    &format!("'{}' is not a numeric catalog code", code),
                ));
            }
        }

        if self.ledger.merchant_keywords.iter().all(|k| k.trim().is_empty()) {
            return Err(invalid("ledger.merchant_keywords", "must contain a keyword"));
        }

        let epsilon = self.currency.epsilon_micros;
        if !(1..MICROS_PER_CENT).contains(&epsilon) {
            return Err(invalid(
                "currency.epsilon_micros",
                &format!("must be between 1 and {}", MICROS_PER_CENT - 1),
            ));
        }

        if let Some(fee) = &self.delivery_fee {
            if fee.region_marker.is_empty() {
                return Err(invalid("delivery_fee.region_marker", "must not be empty"));
            }
            if !fee.amount.is_positive() {
                return Err(invalid("delivery_fee.amount", "must be positive"));
            }
        }

        Ok(())
    }

    fn summarize_conflicts(&self) -> bool {
        self.itemize.summarize && self.itemize.force_itemize
    }

    /// Tolerance for nearly-equal comparisons.
    pub fn epsilon(&self) -> Money {
        Money::from_micros(self.currency.epsilon_micros)
    }

    pub fn partition_timeout(&self) -> Duration {
        Duration::from_millis(self.matching.partition_timeout_ms)
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
