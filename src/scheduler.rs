//! Runtime driver for the trigger scheduler.
//!
//! One tokio task owns the [`Scheduler`] from the core crate and feeds
//! it events and the current time. Time is measured as milliseconds
//! since the task started on [`tokio::time::Instant`], so tests can run
//! it under a paused clock.
//!
//! ```text
//!  ObservedStore ──RecordChanged──┐
//!  settings ──────ConfigChanged───┤   ┌───────────┐   SyncTrigger   ┌────────────┐
//!  netprobe ──────Network(bool)───┼──▶│ Scheduler │────────────────▶│ SyncRunner │
//!  shutdown ──────Shutdown────────┘   └───────────┘  (spawned task) └────────────┘
//! ```
//!
//! Fired triggers run on their own tasks so the loop never waits on the
//! network. Overlapping runs for one collection are serialized by the
//! runner.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use tidesync_core::models::{AutoSyncConfig, RecordChanged};
use tidesync_core::schedule::{Scheduler, SyncTrigger};

/// Executes a fired trigger.
#[async_trait]
pub trait SyncRunner: Send + Sync {
    async fn run_trigger(&self, trigger: SyncTrigger);
}

#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    RecordChanged(RecordChanged),
    ConfigChanged(AutoSyncConfig),
    Network(bool),
    Shutdown,
}

/// Cheap, cloneable sender side of a running scheduler.
#[derive(Clone)]
pub struct SchedulerHandle {
    tx: mpsc::UnboundedSender<SchedulerEvent>,
}

impl SchedulerHandle {
    fn send(&self, event: SchedulerEvent) {
        if self.tx.send(event).is_err() {
            debug!("scheduler already stopped");
        }
    }

    pub fn record_changed(&self, change: RecordChanged) {
        self.send(SchedulerEvent::RecordChanged(change));
    }

    pub fn set_config(&self, config: AutoSyncConfig) {
        self.send(SchedulerEvent::ConfigChanged(config));
    }

    pub fn set_online(&self, online: bool) {
        self.send(SchedulerEvent::Network(online));
    }

    pub fn shutdown(&self) {
        self.send(SchedulerEvent::Shutdown);
    }

    /// Forward a store change feed into the scheduler until either side
    /// closes.
    pub fn forward_changes(&self, mut rx: broadcast::Receiver<RecordChanged>) -> JoinHandle<()> {
        let handle = self.clone();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(change) => {
                        if handle.tx.send(SchedulerEvent::RecordChanged(change)).is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "change feed lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

/// Start the scheduler task.
pub fn spawn_scheduler(
    runner: Arc<dyn SyncRunner>,
    config: AutoSyncConfig,
) -> (SchedulerHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(run_loop(runner, config, rx));
    (SchedulerHandle { tx }, task)
}

async fn run_loop(
    runner: Arc<dyn SyncRunner>,
    config: AutoSyncConfig,
    mut rx: mpsc::UnboundedReceiver<SchedulerEvent>,
) {
    let origin = Instant::now();
    let now_ms = || origin.elapsed().as_millis() as u64;
    let mut scheduler = Scheduler::new(config, now_ms());
    let mut current = config;
    info!(
        enabled = config.enabled,
        interval_minutes = config.interval_minutes,
        debounce_seconds = config.debounce_seconds,
        "scheduler started"
    );

    loop {
        let deadline = scheduler
            .next_deadline()
            .map(|ms| origin + Duration::from_millis(ms));

        let event = match deadline {
            Some(at) => tokio::select! {
                event = rx.recv() => event,
                _ = sleep_until(at) => {
                    dispatch(&runner, scheduler.poll(now_ms()));
                    continue;
                }
            },
            None => rx.recv().await,
        };

        match event {
            None | Some(SchedulerEvent::Shutdown) => break,
            Some(SchedulerEvent::RecordChanged(change)) => {
                if scheduler.record_write(change.collection, now_ms()) {
                    debug!(collection = %change.collection, id = %change.id, "debounce armed");
                }
            }
            Some(SchedulerEvent::ConfigChanged(config)) => {
                if config != current {
                    info!(enabled = config.enabled, "auto-sync settings changed");
                    scheduler.set_config(config, now_ms());
                    current = config;
                }
            }
            Some(SchedulerEvent::Network(online)) => {
                if online != scheduler.is_online() {
                    info!(online, "network state changed");
                }
                dispatch(&runner, scheduler.set_online(online, now_ms()));
            }
        }
    }
    debug!("scheduler stopped");
}

fn dispatch(runner: &Arc<dyn SyncRunner>, triggers: Vec<SyncTrigger>) {
    for trigger in triggers {
        let runner = runner.clone();
        tokio::spawn(async move { runner.run_trigger(trigger).await });
    }
}
