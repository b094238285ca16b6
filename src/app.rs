//! Wiring of stores, remote, auth, and orchestrator for one database.

use std::sync::Arc;

use anyhow::Result;

use tidesync_core::clock::{Clock, SystemClock};
use tidesync_core::models::{AutoSyncConfig, Collection, Settings};
use tidesync_core::remote::{AuthProvider, RemoteAdapter};
use tidesync_core::store::SettingsStore;

use crate::config::Config;
use crate::orchestrator::{OrchestratorOptions, SyncOrchestrator};
use crate::sqlite_store::SqliteStore;
use crate::{db, migrate, remote};

/// Owner id for records created without a session.
pub const LOCAL_OWNER: &str = "local";

pub struct App {
    pub config: Config,
    pub store: Arc<SqliteStore>,
    pub auth: Arc<dyn AuthProvider>,
    pub clock: Arc<dyn Clock>,
    pub orchestrator: Arc<SyncOrchestrator>,
}

impl App {
    /// Open the configured database (migrating it if needed) and connect
    /// the configured remote.
    pub async fn open(config: Config) -> Result<Self> {
        let pool = db::connect(&config).await?;
        migrate::apply(&pool).await?;
        let remote = remote::connect(&config);
        let auth: Arc<dyn AuthProvider> = Arc::new(remote::auth_from_config(&config));
        Ok(Self::with_parts(
            config,
            SqliteStore::new(pool),
            remote,
            auth,
            Arc::new(SystemClock),
        ))
    }

    pub fn with_parts(
        config: Config,
        store: SqliteStore,
        remote: Arc<dyn RemoteAdapter>,
        auth: Arc<dyn AuthProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let store = Arc::new(store);
        let options = OrchestratorOptions {
            remote_timeout: std::time::Duration::from_secs(config.remote_timeout_secs()),
        };
        let orchestrator = Arc::new(SyncOrchestrator::new(
            store.clone(),
            store.clone(),
            remote,
            auth.clone(),
            clock.clone(),
            options,
        ));
        Self {
            config,
            store,
            auth,
            clock,
            orchestrator,
        }
    }

    /// `user_id` for new records: the session's, else the configured one.
    pub fn owner(&self) -> String {
        self.auth
            .principal()
            .map(|p| p.user_id)
            .or_else(|| self.config.auth.user_id.clone())
            .unwrap_or_else(|| LOCAL_OWNER.to_string())
    }

    /// Persisted settings, seeded from `[auto_sync]` on first use.
    pub async fn settings(&self) -> Result<Settings> {
        if let Some(settings) = self.store.load_settings().await? {
            return Ok(settings);
        }
        let settings = Settings {
            auto_sync: self.config.auto_sync,
        };
        self.store.save_settings(&settings).await?;
        Ok(settings)
    }

    pub async fn update_auto_sync(
        &self,
        update: impl FnOnce(&mut AutoSyncConfig),
    ) -> Result<Settings> {
        let mut settings = self.settings().await?;
        update(&mut settings.auto_sync);
        self.store.save_settings(&settings).await?;
        Ok(settings)
    }

    /// Flag a sync as owed after a local write. Best-effort.
    pub async fn note_write(&self, collection: Collection) {
        if let Err(err) = self.orchestrator.mark_pending(collection).await {
            tracing::warn!(collection = %collection, error = %err, "could not mark sync pending");
        }
    }

    pub async fn close(&self) {
        self.store.close().await;
    }
}
