//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Every rejected engine operation maps to exactly one of these kinds so that
/// callers can present an actionable message. None of them is fatal to the
/// engine; all are recoverable by the caller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A referenced entity is absent.
    #[error("{0} not found")]
    NotFound(String),

    /// Wrong current status, or the actor's role/identity may not drive this edge.
    #[error("illegal transition: {0}")]
    IllegalTransition(String),

    /// A required field is missing or invalid (e.g. past delivery date).
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// A stock quantity argument was zero or negative.
    #[error("invalid quantity: {0}")]
    InvalidQuantity(i64),

    /// The ledger cannot satisfy a reservation. Nothing was changed.
    #[error(
        "insufficient stock: requested {requested}, available {available} (short by {shortfall})"
    )]
    InsufficientStock {
        requested: i64,
        available: i64,
        shortfall: i64,
    },

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A conflict occurred (e.g. stale version / optimistic concurrency).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The actor's role may not perform a non-transition operation.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
}

impl DomainError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn illegal_transition(msg: impl Into<String>) -> Self {
        Self::IllegalTransition(msg.into())
    }

    pub fn invalid_payload(msg: impl Into<String>) -> Self {
        Self::InvalidPayload(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    /// Build an `InsufficientStock` error; the shortfall is derived.
    pub fn insufficient_stock(requested: i64, available: i64) -> Self {
        Self::InsufficientStock {
            requested,
            available,
            shortfall: (requested - available).max(0),
        }
    }
}
