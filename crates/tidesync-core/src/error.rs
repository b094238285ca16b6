//! Error taxonomy for sync operations.
//!
//! Local stores report failures as [`anyhow::Error`]; everything that
//! crosses the sync boundary (remote adapters, the orchestrator) is
//! expressed as a [`SyncError`] so callers can tell a missing session
//! from a flaky network without string matching.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// The remote backend has no credentials. Sync stays disabled.
    #[error("remote backend is not configured")]
    NotConfigured,

    /// No active session. The user has to sign in before the next cycle.
    #[error("not authenticated")]
    NotAuthenticated,

    #[error("network error: {0}")]
    Network(String),

    #[error("remote error {status}: {message}")]
    Remote { status: u16, message: String },

    #[error("remote call timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The local store failed. Fatal for the current operation.
    #[error("local storage error: {0}")]
    LocalStorage(String),

    #[error("invalid record: {0}")]
    InvalidRecord(String),
}

impl SyncError {
    /// Transient failures. The core never retries them itself; the next
    /// trigger does.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::Network(_) | SyncError::Remote { .. } | SyncError::Timeout { .. }
        )
    }

    pub fn local(err: anyhow::Error) -> Self {
        SyncError::LocalStorage(format!("{:#}", err))
    }
}

pub type SyncResult<T> = std::result::Result<T, SyncError>;
