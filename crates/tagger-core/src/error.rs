//! # Error Types
//!
//! Domain-specific error types for tagger-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  TaggerError          - Aborts a run (logic defects, bad config)       │
//! │  ├── ValidationError  - A report field could not be decoded            │
//! │  └── ConfigError      - TOML could not be parsed or a knob is invalid  │
//! │                                                                         │
//! │  NOT errors (counted in RunStats instead):                             │
//! │  • unmatched charges / refunds / transactions                          │
//! │  • reconciliation gaps no repair rule explains                         │
//! │  • partition timeouts and skipped combinatorial orders                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (order id, transaction id, field)
//! 3. Errors are enum variants, never String
//! 4. Only invariant violations abort a run; data-quality problems never do

use thiserror::Error;

use crate::money::Money;

// =============================================================================
// Tagger Error
// =============================================================================

/// Errors that abort a reconciliation run.
#[derive(Debug, Error)]
pub enum TaggerError {
    /// A decoded row failed validation.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Items were about to be assigned to a charge that already owns items.
    ///
    /// ## When This Occurs
    /// Only through a logic defect in association: every charge receives
    /// items at most once per run.
    #[error("Charge {charge_id} already has items assigned")]
    ChargeAlreadyAssigned { charge_id: String },

    /// Generated replacement entries do not add up to the transaction.
    ///
    /// ## User Workflow
    /// ```text
    /// Transaction $20.00 ──► Itemizer ──► entries sum to $19.99
    ///                                          │
    ///                                          ▼
    ///                       ItemizedSumMismatch (run aborts, nothing sent)
    /// ```
    #[error("Itemized entries for transaction {transaction_id} sum to {actual}, expected {expected}")]
    ItemizedSumMismatch {
        transaction_id: String,
        expected: Money,
        actual: Money,
    },

    /// A charge reached the itemizer with no line items.
    #[error("Charge {charge_id} has no line items")]
    EmptyCharge { charge_id: String },

    /// Two input records of the same kind share an id.
    ///
    /// Matches are stored by record id, so ids must be unique per kind.
    /// `rows::decode_charges` and `rows::decode_refunds` number records
    /// per order to guarantee this.
    #[error("Duplicate {kind} id {record_id}")]
    DuplicateRecordId { kind: &'static str, record_id: String },
}

// =============================================================================
// Validation Error
// =============================================================================

/// Field-level decoding failures.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Invalid format (e.g., unparseable date or amount).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },
}

// =============================================================================
// Config Error
// =============================================================================

/// Configuration loading failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid config value for {field}: {reason}")]
    Invalid { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with TaggerError.
pub type TaggerResult<T> = Result<T, TaggerError>;

// =============================================================================
// Unit Tests
// =============================================================================
