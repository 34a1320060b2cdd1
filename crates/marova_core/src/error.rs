use chrono::{DateTime, Utc};
use thiserror::Error;

/// Failure taxonomy surfaced by every engine operation.
///
/// A failed operation never commits; the caller decides whether to retry.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed or out-of-range input.
    #[error("invalid input: {0}")]
    Validation(String),

    /// A referenced user or token does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A precondition is not met (no tokens, no energy, not asleep).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Memory uplinks are cooling down for this user.
    #[error("rate limited: memory uplinks unlock after {}", next_allowed.to_rfc3339())]
    RateLimited { next_allowed: DateTime<Utc> },

    /// The snapshot store failed to read or write.
    #[error("storage failure: {0:#}")]
    Storage(#[from] anyhow::Error),
}

impl EngineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Stable short label, used by the CLI for exit reporting.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::RateLimited { .. } => "rate_limited",
            Self::Storage(_) => "storage",
        }
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
