//! Deterministic trigger scheduler.
//!
//! Decides *when* a sync should run. The scheduler owns no timers and
//! reads no clock: every call takes the current time as `now_ms`
//! (milliseconds on any monotonic scale), and the caller asks
//! [`Scheduler::next_deadline`] how long it may sleep before calling
//! [`Scheduler::poll`]. A runtime driver owns the only instance, so a
//! cancellation and a fire can never both apply: whichever mutation the
//! driver performs first wins.
//!
//! # Triggers
//!
//! | Trigger | Fires | Collections |
//! |---------|-------|-------------|
//! | Periodic | every `interval_minutes` | all |
//! | Debounced | `debounce_seconds` after the last write, rearmed by each write | the written one |
//! | Network restore | immediately on an offline → online transition, if `sync_on_network_restore` | all |
//!
//! All three are gated on `enabled`. Disabling drops every pending
//! deadline; re-enabling arms the periodic trigger one full interval
//! out rather than firing right away.

use std::collections::{BTreeMap, BTreeSet};

use crate::models::{AutoSyncConfig, Collection};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerReason {
    Periodic,
    Debounced,
    NetworkRestore,
}

impl TriggerReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerReason::Periodic => "periodic",
            TriggerReason::Debounced => "debounced",
            TriggerReason::NetworkRestore => "network_restore",
        }
    }
}

/// A request to run a full sync of one collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncTrigger {
    pub collection: Collection,
    pub reason: TriggerReason,
}

#[derive(Debug, Clone)]
pub struct Scheduler {
    config: AutoSyncConfig,
    watched: BTreeSet<Collection>,
    online: bool,
    next_periodic: Option<u64>,
    debounce: BTreeMap<Collection, u64>,
}

impl Scheduler {
    /// Create a scheduler watching every collection. Starts online.
    pub fn new(config: AutoSyncConfig, now_ms: u64) -> Self {
        let mut scheduler = Self {
            config,
            watched: Collection::ALL.into_iter().collect(),
            online: true,
            next_periodic: None,
            debounce: BTreeMap::new(),
        };
        if config.enabled {
            scheduler.arm_periodic(now_ms);
        }
        scheduler
    }

    /// Restrict debounced triggers to `collections`.
    pub fn watching(mut self, collections: &[Collection]) -> Self {
        self.watched = collections.iter().copied().collect();
        self
    }

    pub fn config(&self) -> &AutoSyncConfig {
        &self.config
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    /// Apply new settings.
    ///
    /// Disabling cancels everything. Enabling, or changing the interval,
    /// rearms the periodic trigger one interval from `now_ms`. Pending
    /// debounce deadlines keep the window they were armed with.
    pub fn set_config(&mut self, config: AutoSyncConfig, now_ms: u64) {
        let previous = self.config;
        self.config = config;

        if !config.enabled {
            self.next_periodic = None;
            self.debounce.clear();
            return;
        }
        if !previous.enabled || previous.interval_minutes != config.interval_minutes {
            self.arm_periodic(now_ms);
        }
    }

    /// Observe a local write. Returns `true` if a debounce timer was
    /// (re)armed.
    pub fn record_write(&mut self, collection: Collection, now_ms: u64) -> bool {
        if !self.config.enabled || !self.watched.contains(&collection) {
            return false;
        }
        self.debounce
            .insert(collection, now_ms.saturating_add(self.config.debounce_ms()));
        true
    }

    /// Observe connectivity. An offline → online transition yields an
    /// immediate trigger per collection when enabled and
    /// `sync_on_network_restore` is set. Timers are left untouched.
    pub fn set_online(&mut self, online: bool, _now_ms: u64) -> Vec<SyncTrigger> {
        let restored = online && !self.online;
        self.online = online;
        if !restored || !self.config.enabled || !self.config.sync_on_network_restore {
            return Vec::new();
        }
        Collection::ALL
            .into_iter()
            .map(|collection| SyncTrigger {
                collection,
                reason: TriggerReason::NetworkRestore,
            })
            .collect()
    }

    /// Earliest pending deadline, if any.
    pub fn next_deadline(&self) -> Option<u64> {
        self.debounce
            .values()
            .copied()
            .chain(self.next_periodic)
            .min()
    }

    /// Deadline of the pending debounce timer for `collection`.
    pub fn debounce_deadline(&self, collection: Collection) -> Option<u64> {
        self.debounce.get(&collection).copied()
    }

    pub fn periodic_deadline(&self) -> Option<u64> {
        self.next_periodic
    }

    /// Fire every deadline at or before `now_ms`.
    ///
    /// Each collection appears at most once in the result; a periodic
    /// fire absorbs a debounce deadline that is due at the same poll.
    pub fn poll(&mut self, now_ms: u64) -> Vec<SyncTrigger> {
        if !self.config.enabled {
            return Vec::new();
        }

        let mut fired: Vec<SyncTrigger> = Vec::new();

        if self.next_periodic.is_some_and(|at| at <= now_ms) {
            fired.extend(Collection::ALL.into_iter().map(|collection| SyncTrigger {
                collection,
                reason: TriggerReason::Periodic,
            }));
            self.arm_periodic(now_ms);
        }

        let due: Vec<Collection> = self
            .debounce
            .iter()
            .filter(|(_, at)| **at <= now_ms)
            .map(|(c, _)| *c)
            .collect();
        for collection in due {
            self.debounce.remove(&collection);
            if fired.iter().all(|t| t.collection != collection) {
                fired.push(SyncTrigger {
                    collection,
                    reason: TriggerReason::Debounced,
                });
            }
        }

        fired
    }

    fn arm_periodic(&mut self, now_ms: u64) {
        self.next_periodic = Some(now_ms.saturating_add(self.config.interval_ms()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIN: u64 = 60_000;

    fn config(debounce_seconds: u32, interval_minutes: u32) -> AutoSyncConfig {
        AutoSyncConfig {
            enabled: true,
            interval_minutes,
            debounce_seconds,
            sync_on_network_restore: true,
        }
    }

    fn debounced(collection: Collection) -> SyncTrigger {
        SyncTrigger {
            collection,
            reason: TriggerReason::Debounced,
        }
    }

    #[test]
    fn test_burst_of_writes_fires_once_after_last_write() {
        let mut s = Scheduler::new(config(10, 60), 0);
        for t in [0, 2_000, 4_000, 6_000, 8_000] {
            assert!(s.record_write(Collection::Todos, t));
            assert!(s.poll(t).is_empty());
        }
        assert_eq!(s.next_deadline(), Some(18_000));
        assert!(s.poll(17_999).is_empty());
        assert_eq!(s.poll(18_000), vec![debounced(Collection::Todos)]);
        assert!(s.poll(30_000).is_empty());
        assert_eq!(s.debounce_deadline(Collection::Todos), None);
    }

    #[test]
    fn test_debounce_is_per_collection() {
        let mut s = Scheduler::new(config(5, 60), 0);
        s.record_write(Collection::Todos, 0);
        s.record_write(Collection::Knowledge, 3_000);
        assert_eq!(s.poll(5_000), vec![debounced(Collection::Todos)]);
        assert_eq!(s.poll(8_000), vec![debounced(Collection::Knowledge)]);
    }

    #[test]
    fn test_disable_mid_debounce_cancels_fire() {
        let mut s = Scheduler::new(config(10, 60), 0);
        s.record_write(Collection::Todos, 1_000);
        s.set_config(
            AutoSyncConfig {
                enabled: false,
                ..config(10, 60)
            },
            5_000,
        );
        assert_eq!(s.next_deadline(), None);
        assert!(s.poll(11_000).is_empty());
        assert!(s.poll(120 * MIN).is_empty());
    }

    #[test]
    fn test_writes_ignored_while_disabled() {
        let mut s = Scheduler::new(
            AutoSyncConfig {
                enabled: false,
                ..config(1, 1)
            },
            0,
        );
        assert!(!s.record_write(Collection::Todos, 0));
        assert_eq!(s.next_deadline(), None);
    }

    #[test]
    fn test_periodic_fires_for_all_collections_and_rearms() {
        let mut s = Scheduler::new(config(10, 5), 0);
        assert_eq!(s.periodic_deadline(), Some(5 * MIN));
        let fired = s.poll(5 * MIN);
        assert_eq!(fired.len(), 2);
        assert!(fired.iter().all(|t| t.reason == TriggerReason::Periodic));
        assert_eq!(s.periodic_deadline(), Some(10 * MIN));
    }

    #[test]
    fn test_reenable_arms_periodic_one_interval_out() {
        let mut s = Scheduler::new(config(10, 5), 0);
        let off = AutoSyncConfig {
            enabled: false,
            ..config(10, 5)
        };
        s.set_config(off, MIN);
        s.set_config(config(10, 5), 7 * MIN);
        assert!(s.poll(7 * MIN).is_empty());
        assert_eq!(s.periodic_deadline(), Some(12 * MIN));
    }

    #[test]
    fn test_interval_change_rearms() {
        let mut s = Scheduler::new(config(10, 5), 0);
        s.set_config(config(10, 30), 2 * MIN);
        assert_eq!(s.periodic_deadline(), Some(32 * MIN));
        // Unrelated change keeps the schedule.
        s.set_config(config(20, 30), 3 * MIN);
        assert_eq!(s.periodic_deadline(), Some(32 * MIN));
    }

    #[test]
    fn test_network_restore_fires_only_on_transition() {
        let mut s = Scheduler::new(config(10, 60), 0);
        assert!(s.set_online(true, 0).is_empty());
        assert!(s.set_online(false, 1_000).is_empty());
        let fired = s.set_online(true, 2_000);
        assert_eq!(fired.len(), 2);
        assert!(fired
            .iter()
            .all(|t| t.reason == TriggerReason::NetworkRestore));
    }

    #[test]
    fn test_network_restore_respects_flag() {
        let mut s = Scheduler::new(
            AutoSyncConfig {
                sync_on_network_restore: false,
                ..config(10, 60)
            },
            0,
        );
        s.set_online(false, 0);
        assert!(s.set_online(true, 1_000).is_empty());
        assert!(s.is_online());
        assert!(s.poll(1_000).is_empty());
    }

    #[test]
    fn test_network_restore_leaves_timers_alone() {
        let mut s = Scheduler::new(config(10, 60), 0);
        s.record_write(Collection::Todos, 0);
        s.set_online(false, 1_000);
        s.set_online(true, 2_000);
        assert_eq!(s.debounce_deadline(Collection::Todos), Some(10_000));
        assert_eq!(s.periodic_deadline(), Some(60 * MIN));
    }

    #[test]
    fn test_unwatched_collection_does_not_debounce() {
        let mut s = Scheduler::new(config(10, 60), 0).watching(&[Collection::Todos]);
        assert!(!s.record_write(Collection::Knowledge, 0));
        assert!(s.record_write(Collection::Todos, 0));
    }

    #[test]
    fn test_periodic_absorbs_due_debounce() {
        let mut s = Scheduler::new(config(10, 1), 0);
        s.record_write(Collection::Todos, 55_000);
        let fired = s.poll(MIN + 5_000);
        assert_eq!(fired.len(), 2);
        assert!(fired.iter().all(|t| t.reason == TriggerReason::Periodic));
        assert_eq!(s.debounce_deadline(Collection::Todos), None);
    }
}
