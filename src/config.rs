//! TOML configuration parsing and validation.
//!
//! ```toml
//! [db]
//! path = "./data/tide.sqlite"
//!
//! [remote]                          # optional; without it sync is disabled
//! url = "https://project.supabase.co"
//! api_key_env = "SUPABASE_ANON_KEY"
//! timeout_secs = 30
//!
//! [auth]
//! user_id = "6f1c…"
//! token_env = "TIDESYNC_ACCESS_TOKEN"
//!
//! [auto_sync]                       # seeds the persisted settings record
//! enabled = true
//! interval_minutes = 5
//! debounce_seconds = 10
//! sync_on_network_restore = true
//!
//! [network]
//! probe_interval_secs = 30
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use tidesync_core::models::AutoSyncConfig;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub remote: Option<RemoteConfig>,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub auto_sync: AutoSyncConfig,
    #[serde(default)]
    pub network: NetworkConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RemoteConfig {
    pub url: String,
    /// Environment variable holding the project API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Hard limit on every remote call.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_key_env() -> String {
    "SUPABASE_ANON_KEY".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    #[serde(default)]
    pub user_id: Option<String>,
    /// Environment variable holding the session access token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            user_id: None,
            token_env: default_token_env(),
        }
    }
}

fn default_token_env() -> String {
    "TIDESYNC_ACCESS_TOKEN".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct NetworkConfig {
    #[serde(default = "default_probe_interval_secs")]
    pub probe_interval_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            probe_interval_secs: default_probe_interval_secs(),
        }
    }
}

fn default_probe_interval_secs() -> u64 {
    30
}

impl Config {
    /// A config with only a database path; sync is unconfigured.
    pub fn minimal(db_path: PathBuf) -> Self {
        Self {
            db: DbConfig { path: db_path },
            remote: None,
            auth: AuthConfig::default(),
            auto_sync: AutoSyncConfig::default(),
            network: NetworkConfig::default(),
        }
    }

    /// Timeout applied to remote calls.
    pub fn remote_timeout_secs(&self) -> u64 {
        self.remote
            .as_ref()
            .map(|r| r.timeout_secs)
            .unwrap_or_else(default_timeout_secs)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if let Some(remote) = &config.remote {
        if !(remote.url.starts_with("http://") || remote.url.starts_with("https://")) {
            anyhow::bail!("remote.url must start with http:// or https://");
        }
        if remote.timeout_secs == 0 {
            anyhow::bail!("remote.timeout_secs must be > 0");
        }
    }

    config.auto_sync.validate()?;

    if config.network.probe_interval_secs == 0 {
        anyhow::bail!("network.probe_interval_secs must be > 0");
    }

    Ok(config)
}
