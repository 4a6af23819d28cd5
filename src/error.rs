//! Failure classes that decide how a run ends.

use thiserror::Error;

/// Domain failures surfaced by a run.
///
/// Everything else travels as `anyhow::Error` with context; these variants
/// are the ones callers branch on.
#[derive(Debug, Error)]
pub enum RunError {
    /// Required credentials are absent; nothing was contacted.
    #[error("missing required environment variables: {}", .0.join(", "))]
    MissingConfig(Vec<String>),

    /// Sentiment or price fetch failed; state was left untouched.
    #[error("market data unavailable: {0}")]
    DataUnavailable(String),

    /// The summary could not be delivered; state and ledger are already saved.
    #[error("notification failed: {0}")]
    NotificationFailure(String),

    /// Persisted state carries a schema version this build cannot read.
    #[error("unsupported portfolio state version {found} (expected at most {supported})")]
    UnsupportedStateVersion { found: u32, supported: u32 },

    /// Strategy ladder violates its invariants.
    #[error("invalid strategy config: {0}")]
    InvalidStrategy(String),
}

impl RunError {
    /// Wrap any error chain as a data failure, keeping its context.
    pub fn data_unavailable(err: impl std::fmt::Display) -> Self {
        Self::DataUnavailable(format!("{:#}", err))
    }
}
