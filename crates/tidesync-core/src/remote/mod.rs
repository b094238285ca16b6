//! Remote system-of-record abstraction.
//!
//! The remote copy is not authoritative: convergence is defined by the
//! merge rule, so adapters only move rows. They must report every failure
//! as a [`SyncError`]; the orchestrator decides what is retryable.
//!
//! # Implementations
//!
//! - [`DisabledRemote`]: no backend configured; every call fails with
//!   [`SyncError::NotConfigured`].
//! - [`memory::InMemoryRemote`]: shared in-process table set with
//!   failure injection, for tests and multi-replica simulations.
//! - The Supabase REST adapter lives in the application crate.

pub mod memory;

use async_trait::async_trait;

use crate::error::SyncError;
use crate::models::{Collection, Record};

/// An authenticated identity scoping remote reads and writes.
#[derive(Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: String,
    pub access_token: String,
}

impl std::fmt::Debug for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Principal")
            .field("user_id", &self.user_id)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

/// Source of the current session.
pub trait AuthProvider: Send + Sync {
    fn principal(&self) -> Option<Principal>;

    fn is_authenticated(&self) -> bool {
        self.principal().is_some()
    }
}

/// Auth provider with a fixed (possibly absent) principal.
#[derive(Debug, Clone, Default)]
pub struct StaticAuth {
    principal: Option<Principal>,
}

impl StaticAuth {
    pub fn new(principal: Option<Principal>) -> Self {
        Self { principal }
    }

    pub fn signed_in(user_id: &str, access_token: &str) -> Self {
        Self::new(Some(Principal {
            user_id: user_id.to_string(),
            access_token: access_token.to_string(),
        }))
    }

    pub fn signed_out() -> Self {
        Self::new(None)
    }
}

impl AuthProvider for StaticAuth {
    fn principal(&self) -> Option<Principal> {
        self.principal.clone()
    }
}

#[async_trait]
pub trait RemoteAdapter: Send + Sync {
    /// Idempotent upsert keyed by record id. Rows are written with
    /// `user_id` set to the principal.
    async fn upsert(
        &self,
        collection: Collection,
        records: &[Record],
        principal: &Principal,
    ) -> Result<(), SyncError>;

    /// Every row the principal owns in `collection`, newest first.
    async fn fetch_all(
        &self,
        collection: Collection,
        principal: &Principal,
    ) -> Result<Vec<Record>, SyncError>;

    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// `false` when no backend is set up and every call would fail with
    /// [`SyncError::NotConfigured`].
    fn is_configured(&self) -> bool {
        true
    }
}

/// Remote adapter used when no backend is configured.
pub struct DisabledRemote;

#[async_trait]
impl RemoteAdapter for DisabledRemote {
    async fn upsert(
        &self,
        _collection: Collection,
        _records: &[Record],
        _principal: &Principal,
    ) -> Result<(), SyncError> {
        Err(SyncError::NotConfigured)
    }

    async fn fetch_all(
        &self,
        _collection: Collection,
        _principal: &Principal,
    ) -> Result<Vec<Record>, SyncError> {
        Err(SyncError::NotConfigured)
    }

    fn name(&self) -> &str {
        "disabled"
    }

    fn is_configured(&self) -> bool {
        false
    }
}
