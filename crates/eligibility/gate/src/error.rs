//! Error types for eligibility evaluation
//!
//! None of these ever reach the caller of the gate: stores return
//! [`StoreError`], policies turn those into blocking results, and the gate
//! turns a [`PolicyError`] into an `evaluation_error` block.

use thiserror::Error;

/// Failure reading from a backing store
///
/// A missing record is not an error; ports return `Ok(None)` for it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Store could not be reached or refused the query
    #[error("{store} store unavailable: {reason}")]
    Unavailable { store: &'static str, reason: String },

    /// Store answered with a record we could not interpret
    #[error("{store} store returned a malformed record: {reason}")]
    Malformed { store: &'static str, reason: String },

    /// Store did not answer within the configured bound
    #[error("{store} store timed out after {timeout_ms}ms")]
    Timeout { store: &'static str, timeout_ms: u64 },
}

impl StoreError {
    pub fn unavailable(store: &'static str, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            store,
            reason: reason.into(),
        }
    }

    pub fn malformed(store: &'static str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            store,
            reason: reason.into(),
        }
    }

    /// True when the dependency could not be consulted at all, as opposed to
    /// answering with something unexpected
    pub fn is_verification_failure(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::Timeout { .. })
    }

    pub fn store(&self) -> &'static str {
        match self {
            Self::Unavailable { store, .. }
            | Self::Malformed { store, .. }
            | Self::Timeout { store, .. } => store,
        }
    }
}

/// Result type for store ports
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors a policy may surface to the gate
///
/// Policies are expected to translate their own failures into blocking
/// results; returning one of these means the policy broke that contract.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// Policy evaluation failed
    #[error("Policy evaluation failed: {reason}")]
    EvaluationFailed { reason: String },

    /// Store failure the policy did not handle
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result type for policy evaluation
pub type Result<T> = std::result::Result<T, PolicyError>;

/// Failure delivering a block event to the analytics sink
#[derive(Debug, Clone, Error)]
#[error("Analytics sink error: {0}")]
pub struct SinkError(pub String);

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
