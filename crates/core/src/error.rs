//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Deterministic business failures only (validation and ledger invariants).
/// Missing records, ownership and write conflicts are modelled by the store
/// and engine layers that detect them.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. blank name, non-positive rate).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A points value resolved to something the ledger cannot record.
    #[error("invalid points: {0}")]
    InvalidPoints(String),

    /// A redemption asked for more points than the child currently holds.
    #[error("insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: i64, available: i64 },

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_points(msg: impl Into<String>) -> Self {
        Self::InvalidPoints(msg.into())
    }

    pub fn insufficient_balance(requested: i64, available: i64) -> Self {
        Self::InsufficientBalance {
            requested,
            available,
        }
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }
}
