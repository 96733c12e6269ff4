//! Error types for the blocking engine

use uuid::Uuid;

/// Errors produced by the blocking engine
///
/// Lock contention is deliberately not an error: a reconciliation that cannot
/// take the per-provider lock reports `ReconcileOutcome::Skipped` instead.
#[derive(Debug, thiserror::Error)]
pub enum BlockingError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A consumed external service (debt ledger, mail transport) failed
    #[error("External service '{service}' failed: {message}")]
    ExternalService { service: &'static str, message: String },

    /// A consumed external service did not answer within its deadline
    #[error("External service '{service}' timed out")]
    Timeout { service: &'static str },

    /// Malformed rule/template/schedule configuration, rejected at write time
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Referenced entity does not exist
    #[error("{0} not found: {1}")]
    NotFound(&'static str, Uuid),

    /// Requested state transition is not allowed from the current status
    #[error("Invalid transition from '{from}' to '{to}'")]
    InvalidTransition { from: String, to: String },
}

/// Result type alias for blocking operations
pub type BlockingResult<T> = Result<T, BlockingError>;
