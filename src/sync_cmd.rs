//! `tide sync`, `tide status`, and `tide settings`.

use anyhow::{bail, Result};

use tidesync_core::models::{AutoSyncConfig, Collection};
use tidesync_core::SyncResult;

use crate::app::App;
use crate::orchestrator::{SyncOp, SyncReport};

/// Run `op` on `collection`, or on every collection when `None`.
///
/// Per-collection outcomes go to stdout / stderr; the command fails if
/// any collection failed.
pub async fn run_sync(app: &App, op: SyncOp, collection: Option<Collection>) -> Result<()> {
    let collections = match collection {
        Some(c) => vec![c],
        None => Collection::ALL.to_vec(),
    };

    let mut failed = 0;
    for c in &collections {
        let result = app.orchestrator.run(*c, op).await;
        if !print_outcome(*c, op, &result) {
            failed += 1;
        }
    }

    if failed > 0 {
        bail!(
            "{} of {} collection(s) failed to sync",
            failed,
            collections.len()
        );
    }
    Ok(())
}

/// Print one outcome line. Returns `true` on success.
pub fn print_outcome(collection: Collection, op: SyncOp, result: &SyncResult<SyncReport>) -> bool {
    match result {
        Ok(report) => {
            println!(
                "{} {}: pushed {}, fetched {}, written {}{}",
                op,
                collection,
                report.pushed,
                report.fetched,
                report.written,
                if report.coalesced { " (coalesced)" } else { "" }
            );
            true
        }
        Err(err) => {
            eprintln!("{} {}: {}", op, collection, err);
            false
        }
    }
}

pub async fn run_status(app: &App) -> Result<()> {
    for collection in Collection::ALL {
        let status = app.orchestrator.status(collection).await?;
        let last = status
            .last_sync
            .map(|ts| ts.to_rfc3339())
            .unwrap_or_else(|| "never".to_string());
        let count = app.store.count(collection).await?;
        println!(
            "{:<10} records: {:<5} last sync: {}{}",
            collection,
            count,
            last,
            if status.pending { "  (pending)" } else { "" }
        );
    }
    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsUpdate {
    pub enabled: Option<bool>,
    pub interval_minutes: Option<u32>,
    pub debounce_seconds: Option<u32>,
    pub network_restore: Option<bool>,
}

impl SettingsUpdate {
    pub fn apply(&self, config: &mut AutoSyncConfig) {
        if let Some(v) = self.enabled {
            config.enabled = v;
        }
        if let Some(v) = self.interval_minutes {
            config.interval_minutes = v;
        }
        if let Some(v) = self.debounce_seconds {
            config.debounce_seconds = v;
        }
        if let Some(v) = self.network_restore {
            config.sync_on_network_restore = v;
        }
    }
}

pub fn print_auto_sync(config: &AutoSyncConfig) {
    println!("auto_sync.enabled = {}", config.enabled);
    println!("auto_sync.interval_minutes = {}", config.interval_minutes);
    println!("auto_sync.debounce_seconds = {}", config.debounce_seconds);
    println!(
        "auto_sync.sync_on_network_restore = {}",
        config.sync_on_network_restore
    );
}

pub async fn run_settings_show(app: &App) -> Result<()> {
    let settings = app.settings().await?;
    print_auto_sync(&settings.auto_sync);
    Ok(())
}

pub async fn run_settings_set(app: &App, update: SettingsUpdate) -> Result<()> {
    let settings = app.update_auto_sync(|c| update.apply(c)).await?;
    print_auto_sync(&settings.auto_sync);
    Ok(())
}
