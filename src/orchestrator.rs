//! Push/pull coordination per collection.
//!
//! [`SyncOrchestrator`] is the only component that talks to both the
//! local stores and the remote adapter. A cycle for one collection is:
//!
//! 1. **Push**: read every local record and upsert the ones the remote
//!    is missing or holds an older version of.
//! 2. **Pull**: fetch every remote row the principal owns, merge with the
//!    local set (LWW, see [`tidesync_core::merge`]), and write back only
//!    the records the merge changed.
//!
//! The ledger's `last_sync` is bumped, and `pending` cleared, only after
//! the remote confirmed the step. A failure leaves local data and the
//! ledger exactly as they were.
//!
//! # Concurrency
//!
//! At most one run per collection is in flight. A request that arrives
//! while a run is in flight is queued behind it. If a queued request of a
//! covering kind already exists (`full` covers everything; `push` and
//! `pull` cover themselves) the new request joins it instead and returns
//! that run's report with `coalesced = true`. The queued request starts
//! after the in-flight one finishes, so it always sees writes made
//! before the joiner asked.
//!
//! No lock on the local stores is held across a remote call. Every remote
//! call runs under a hard timeout.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use tidesync_core::clock::Clock;
use tidesync_core::merge::merge_plan;
use tidesync_core::models::{Collection, Record, SyncStatus};
use tidesync_core::remote::{AuthProvider, Principal, RemoteAdapter};
use tidesync_core::schedule::SyncTrigger;
use tidesync_core::store::{RecordStore, StatusLedger};
use tidesync_core::{SyncError, SyncResult};

use crate::scheduler::SyncRunner;

pub const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncOp {
    Push,
    Pull,
    Full,
}

impl SyncOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncOp::Push => "push",
            SyncOp::Pull => "pull",
            SyncOp::Full => "full",
        }
    }

    fn covers(self, other: SyncOp) -> bool {
        self == SyncOp::Full || self == other
    }
}

impl std::fmt::Display for SyncOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncPhase {
    #[default]
    Idle,
    Pushing,
    Pulling,
    /// The last cycle failed. Ends that cycle; the next cycle leaves it
    /// for `Idle` as soon as it starts. The failure itself stays in
    /// [`SyncSnapshot::last_error`] until a cycle succeeds.
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub collection: Collection,
    pub op: SyncOp,
    /// Records sent to the remote.
    pub pushed: usize,
    /// Rows returned by the remote.
    pub fetched: usize,
    /// Local records created or overwritten by the merge.
    pub written: usize,
    /// This request was satisfied by another queued run.
    pub coalesced: bool,
}

impl SyncReport {
    fn new(collection: Collection, op: SyncOp) -> Self {
        Self {
            collection,
            op,
            pushed: 0,
            fetched: 0,
            written: 0,
            coalesced: false,
        }
    }
}

/// Observable per-collection state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSnapshot {
    pub phase: SyncPhase,
    pub last_error: Option<SyncError>,
    pub last_report: Option<SyncReport>,
}

#[derive(Debug, Clone, Copy)]
pub struct OrchestratorOptions {
    pub remote_timeout: Duration,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            remote_timeout: DEFAULT_REMOTE_TIMEOUT,
        }
    }
}

type Outcome = Option<SyncResult<SyncReport>>;

struct Waiter {
    ticket: u64,
    op: SyncOp,
    rx: watch::Receiver<Outcome>,
}

#[derive(Default)]
struct Lane {
    run: tokio::sync::Mutex<()>,
    waiting: Mutex<Option<Waiter>>,
    snapshot: Mutex<SyncSnapshot>,
}

enum Entry<'a> {
    /// A queued covering request exists; wait for its result.
    Join {
        ticket: u64,
        rx: watch::Receiver<Outcome>,
    },
    /// Nothing in flight.
    Run(tokio::sync::MutexGuard<'a, ()>),
    /// Wait for the in-flight run. `Some` if this request registered
    /// itself as the one others may join.
    Queue(Option<(u64, watch::Sender<Outcome>)>),
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

pub struct SyncOrchestrator {
    records: Arc<dyn RecordStore>,
    ledger: Arc<dyn StatusLedger>,
    remote: Arc<dyn RemoteAdapter>,
    auth: Arc<dyn AuthProvider>,
    clock: Arc<dyn Clock>,
    options: OrchestratorOptions,
    lanes: HashMap<Collection, Lane>,
    tickets: AtomicU64,
}

impl SyncOrchestrator {
    /// `records` should be the bare store, not an
    /// [`ObservedStore`](crate::observed::ObservedStore): pull write-backs
    /// are not user edits and must not re-arm a debounce.
    pub fn new(
        records: Arc<dyn RecordStore>,
        ledger: Arc<dyn StatusLedger>,
        remote: Arc<dyn RemoteAdapter>,
        auth: Arc<dyn AuthProvider>,
        clock: Arc<dyn Clock>,
        options: OrchestratorOptions,
    ) -> Self {
        Self {
            records,
            ledger,
            remote,
            auth,
            clock,
            options,
            lanes: Collection::ALL
                .into_iter()
                .map(|c| (c, Lane::default()))
                .collect(),
            tickets: AtomicU64::new(0),
        }
    }

    pub async fn push(&self, collection: Collection) -> SyncResult<SyncReport> {
        self.request(collection, SyncOp::Push).await
    }

    pub async fn pull(&self, collection: Collection) -> SyncResult<SyncReport> {
        self.request(collection, SyncOp::Pull).await
    }

    /// Push, then pull. A failed push skips the pull.
    pub async fn full_sync(&self, collection: Collection) -> SyncResult<SyncReport> {
        self.request(collection, SyncOp::Full).await
    }

    /// Full sync of every collection in turn. One failing collection does
    /// not stop the others.
    pub async fn full_sync_all(&self) -> Vec<(Collection, SyncResult<SyncReport>)> {
        let mut results = Vec::with_capacity(Collection::ALL.len());
        for collection in Collection::ALL {
            results.push((collection, self.full_sync(collection).await));
        }
        results
    }

    pub async fn run(&self, collection: Collection, op: SyncOp) -> SyncResult<SyncReport> {
        self.request(collection, op).await
    }

    pub fn snapshot(&self, collection: Collection) -> SyncSnapshot {
        lock(&self.lane(collection).snapshot).clone()
    }

    /// Ledger entry for `collection`.
    pub async fn status(&self, collection: Collection) -> SyncResult<SyncStatus> {
        self.ledger
            .get_status(collection)
            .await
            .map_err(SyncError::local)
    }

    /// Flag that a sync is owed for `collection`.
    pub async fn mark_pending(&self, collection: Collection) -> SyncResult<()> {
        self.ledger
            .set_pending(collection, true)
            .await
            .map_err(SyncError::local)
    }

    fn lane(&self, collection: Collection) -> &Lane {
        &self.lanes[&collection]
    }

    fn enter<'a>(&self, lane: &'a Lane, op: SyncOp) -> Entry<'a> {
        let mut waiting = lock(&lane.waiting);
        if let Some(w) = waiting.as_ref().filter(|w| w.op.covers(op)) {
            return Entry::Join {
                ticket: w.ticket,
                rx: w.rx.clone(),
            };
        }
        if let Ok(guard) = lane.run.try_lock() {
            return Entry::Run(guard);
        }
        if waiting.is_some() {
            return Entry::Queue(None);
        }
        let ticket = self.tickets.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = watch::channel(None);
        *waiting = Some(Waiter { ticket, op, rx });
        Entry::Queue(Some((ticket, tx)))
    }

    fn clear_waiter(lane: &Lane, ticket: u64) {
        let mut waiting = lock(&lane.waiting);
        if waiting.as_ref().is_some_and(|w| w.ticket == ticket) {
            *waiting = None;
        }
    }

    async fn request(&self, collection: Collection, op: SyncOp) -> SyncResult<SyncReport> {
        let lane = self.lane(collection);
        loop {
            match self.enter(lane, op) {
                Entry::Join { ticket, mut rx } => {
                    let joined = match rx.wait_for(|o| o.is_some()).await {
                        Ok(outcome) => (*outcome).clone(),
                        Err(_) => None,
                    };
                    match joined {
                        Some(result) => {
                            debug!(collection = %collection, op = %op, "request coalesced");
                            return result.map(|report| SyncReport {
                                coalesced: true,
                                ..report
                            });
                        }
                        // The queued request was dropped before running.
                        None => {
                            Self::clear_waiter(lane, ticket);
                            continue;
                        }
                    }
                }
                Entry::Run(_guard) => return self.execute(collection, op).await,
                Entry::Queue(registration) => {
                    let _guard = lane.run.lock().await;
                    let tx = registration.map(|(ticket, tx)| {
                        Self::clear_waiter(lane, ticket);
                        tx
                    });
                    let result = self.execute(collection, op).await;
                    if let Some(tx) = tx {
                        tx.send_replace(Some(result.clone()));
                    }
                    return result;
                }
            }
        }
    }

    async fn execute(&self, collection: Collection, op: SyncOp) -> SyncResult<SyncReport> {
        self.set_phase(collection, SyncPhase::Idle);
        let result = self.cycle(collection, op).await;
        self.finish(collection, op, &result);
        result
    }

    async fn cycle(&self, collection: Collection, op: SyncOp) -> SyncResult<SyncReport> {
        if !self.remote.is_configured() {
            return Err(SyncError::NotConfigured);
        }
        let principal = self.auth.principal().ok_or(SyncError::NotAuthenticated)?;
        let mut report = SyncReport::new(collection, op);

        if matches!(op, SyncOp::Push | SyncOp::Full) {
            self.set_phase(collection, SyncPhase::Pushing);
            report.pushed = self.push_once(collection, &principal).await?;
        }
        if matches!(op, SyncOp::Pull | SyncOp::Full) {
            self.set_phase(collection, SyncPhase::Pulling);
            let (fetched, written) = self.pull_once(collection, &principal).await?;
            report.fetched = fetched;
            report.written = written;
        }
        Ok(report)
    }

    async fn push_once(&self, collection: Collection, principal: &Principal) -> SyncResult<usize> {
        let records = self
            .records
            .get_all(collection)
            .await
            .map_err(SyncError::local)?;

        let remote = self
            .remote_call(self.remote.fetch_all(collection, principal))
            .await?;
        let outgoing = push_set(records, &remote);

        if !outgoing.is_empty() {
            self.remote_call(self.remote.upsert(collection, &outgoing, principal))
                .await?;
        }

        self.ledger
            .record_success(collection, self.clock.now())
            .await
            .map_err(SyncError::local)?;
        debug!(collection = %collection, records = outgoing.len(), "push confirmed");
        Ok(outgoing.len())
    }

    async fn pull_once(
        &self,
        collection: Collection,
        principal: &Principal,
    ) -> SyncResult<(usize, usize)> {
        let mut remote = self
            .remote_call(self.remote.fetch_all(collection, principal))
            .await?;
        let fetched = remote.len();
        remote.retain(|record| accept_remote(collection, record));

        let local = self
            .records
            .get_all(collection)
            .await
            .map_err(SyncError::local)?;
        let plan = merge_plan(&local, &remote);

        for record in &plan.changed {
            self.records
                .put(collection, record)
                .await
                .map_err(SyncError::local)?;
        }

        self.ledger
            .record_success(collection, self.clock.now())
            .await
            .map_err(SyncError::local)?;
        debug!(
            collection = %collection,
            fetched,
            written = plan.changed.len(),
            "pull merged"
        );
        Ok((fetched, plan.changed.len()))
    }

    async fn remote_call<T>(&self, call: impl Future<Output = SyncResult<T>>) -> SyncResult<T> {
        match tokio::time::timeout(self.options.remote_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::Timeout {
                secs: self.options.remote_timeout.as_secs(),
            }),
        }
    }

    fn set_phase(&self, collection: Collection, phase: SyncPhase) {
        lock(&self.lane(collection).snapshot).phase = phase;
    }

    fn finish(&self, collection: Collection, op: SyncOp, result: &SyncResult<SyncReport>) {
        let mut snapshot = lock(&self.lane(collection).snapshot);
        match result {
            Ok(report) => {
                info!(
                    collection = %collection,
                    op = %op,
                    pushed = report.pushed,
                    fetched = report.fetched,
                    written = report.written,
                    "sync complete"
                );
                snapshot.phase = SyncPhase::Idle;
                snapshot.last_error = None;
                snapshot.last_report = Some(report.clone());
            }
            Err(err) => {
                if *err == SyncError::NotConfigured {
                    debug!(collection = %collection, op = %op, "sync skipped: {}", err);
                } else {
                    warn!(collection = %collection, op = %op, error = %err, "sync failed");
                }
                snapshot.phase = SyncPhase::Error;
                snapshot.last_error = Some(err.clone());
            }
        }
    }
}

/// Local records the remote lacks or holds an older version of.
///
/// Uploading the whole local set would let a replica holding a stale copy
/// overwrite a newer edit from another device; ties stay with the remote,
/// matching the merge rule.
fn push_set(local: Vec<Record>, remote: &[Record]) -> Vec<Record> {
    let remote_versions: HashMap<&str, DateTime<Utc>> = remote
        .iter()
        .map(|r| (r.id(), r.updated_at()))
        .collect();
    local
        .into_iter()
        .filter(|record| {
            remote_versions
                .get(record.id())
                .map_or(true, |remote_at| record.updated_at() > *remote_at)
        })
        .collect()
}

/// Drop remote rows that cannot be stored locally.
fn accept_remote(collection: Collection, record: &Record) -> bool {
    if record.collection() != collection {
        warn!(collection = %collection, id = record.id(), "ignoring row from another collection");
        return false;
    }
    if let Err(err) = record.validate() {
        warn!(collection = %collection, id = record.id(), error = %err, "ignoring invalid remote row");
        return false;
    }
    true
}

#[async_trait]
impl SyncRunner for SyncOrchestrator {
    async fn run_trigger(&self, trigger: SyncTrigger) {
        debug!(
            collection = %trigger.collection,
            reason = trigger.reason.as_str(),
            "auto-sync triggered"
        );
        // Outcome is logged and recorded in the snapshot by `finish`.
        let _ = self.full_sync(trigger.collection).await;
    }
}
