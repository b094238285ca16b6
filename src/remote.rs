//! Remote backend wiring.
//!
//! - **[`SupabaseRemote`]** talks to a Supabase/PostgREST project: one
//!   table per collection, rows scoped by `user_id`, upserts keyed on `id`.
//! - **[`DisabledRemote`]** (from the core crate) answers every call with
//!   [`SyncError::NotConfigured`]; [`connect`] falls back to it when the
//!   `[remote]` section or its API key is missing.
//!
//! # Error mapping
//!
//! | Outcome | Error |
//! |---------|-------|
//! | HTTP 401 / 403 | [`SyncError::NotAuthenticated`] |
//! | Any other non-2xx | [`SyncError::Remote`] with status and body |
//! | Client timeout | [`SyncError::Timeout`] |
//! | Connect / transport failure | [`SyncError::Network`] |
//! | Undecodable row | skipped with a warning |
//! | Unencodable local record | [`SyncError::InvalidRecord`] |

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use tidesync_core::models::{Collection, Record};
use tidesync_core::remote::{DisabledRemote, Principal, RemoteAdapter, StaticAuth};
use tidesync_core::SyncError;

use crate::config::{Config, RemoteConfig};

pub struct SupabaseRemote {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    timeout_secs: u64,
}

impl SupabaseRemote {
    /// Build an adapter, reading the API key from `api_key_env`.
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            anyhow::anyhow!("{} environment variable not set", config.api_key_env)
        })?;
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: &RemoteConfig, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key,
            timeout_secs: config.timeout_secs,
        })
    }

    fn table_url(&self, collection: Collection) -> String {
        format!("{}/rest/v1/{}", self.base_url, collection.table_name())
    }

    fn transport_error(&self, err: reqwest::Error) -> SyncError {
        if err.is_timeout() {
            SyncError::Timeout {
                secs: self.timeout_secs,
            }
        } else {
            SyncError::Network(err.to_string())
        }
    }
}

/// Rows for an upsert body, each stamped with the principal's id.
fn upsert_rows(records: &[Record], principal: &Principal) -> Result<Vec<Value>, SyncError> {
    records
        .iter()
        .map(|record| {
            let mut row = record
                .to_row()
                .map_err(|e| SyncError::InvalidRecord(format!("{}: {:#}", record.id(), e)))?;
            if let Some(obj) = row.as_object_mut() {
                obj.insert(
                    "user_id".to_string(),
                    Value::String(principal.user_id.clone()),
                );
            }
            Ok(row)
        })
        .collect()
}

fn fetch_query(principal: &Principal) -> [(&'static str, String); 3] {
    [
        ("select", "*".to_string()),
        ("user_id", format!("eq.{}", principal.user_id)),
        ("order", "created_at.desc".to_string()),
    ]
}

/// Decode fetched rows, skipping any that do not decode. One malformed
/// row written by another client must not block the whole collection.
fn decode_rows(collection: Collection, rows: Vec<Value>) -> Vec<Record> {
    rows.into_iter()
        .filter_map(|row| {
            let id = row.get("id").and_then(Value::as_str).unwrap_or("?").to_string();
            match Record::from_row(collection, row) {
                Ok(record) => Some(record),
                Err(err) => {
                    warn!(collection = %collection, id = %id, error = %format!("{:#}", err), "skipping undecodable row");
                    None
                }
            }
        })
        .collect()
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, SyncError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status.as_u16() == 401 || status.as_u16() == 403 {
        return Err(SyncError::NotAuthenticated);
    }
    let message = response.text().await.unwrap_or_default();
    Err(SyncError::Remote {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl RemoteAdapter for SupabaseRemote {
    async fn upsert(
        &self,
        collection: Collection,
        records: &[Record],
        principal: &Principal,
    ) -> Result<(), SyncError> {
        if records.is_empty() {
            return Ok(());
        }
        let rows = upsert_rows(records, principal)?;

        let response = self
            .client
            .post(self.table_url(collection))
            .query(&[("on_conflict", "id")])
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", principal.access_token))
            .header("Content-Type", "application/json")
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&rows)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        check_status(response).await?;

        debug!(collection = %collection, rows = rows.len(), "upserted rows");
        Ok(())
    }

    async fn fetch_all(
        &self,
        collection: Collection,
        principal: &Principal,
    ) -> Result<Vec<Record>, SyncError> {
        let response = self
            .client
            .get(self.table_url(collection))
            .query(&fetch_query(principal))
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", principal.access_token))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        let response = check_status(response).await?;

        let rows: Vec<Value> = response
            .json()
            .await
            .map_err(|e| self.transport_error(e))?;

        Ok(decode_rows(collection, rows))
    }

    fn name(&self) -> &str {
        "supabase"
    }
}

/// Instantiate the configured remote adapter.
pub fn connect(config: &Config) -> Arc<dyn RemoteAdapter> {
    let Some(remote) = &config.remote else {
        debug!("no [remote] section; sync disabled");
        return Arc::new(DisabledRemote);
    };
    match SupabaseRemote::new(remote) {
        Ok(adapter) => Arc::new(adapter),
        Err(err) => {
            warn!(error = %err, "remote backend unavailable; sync disabled");
            Arc::new(DisabledRemote)
        }
    }
}

/// Session from `[auth] user_id` and the token in `token_env`. Missing
/// either yields a signed-out provider.
pub fn auth_from_config(config: &Config) -> StaticAuth {
    let token = std::env::var(&config.auth.token_env).ok();
    match (&config.auth.user_id, token) {
        (Some(user_id), Some(token)) if !token.is_empty() => StaticAuth::signed_in(user_id, &token),
        _ => StaticAuth::signed_out(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tidesync_core::models::Todo;

    fn principal() -> Principal {
        Principal {
            user_id: "alice".to_string(),
            access_token: "tok".to_string(),
        }
    }

    fn remote_config(url: &str) -> RemoteConfig {
        RemoteConfig {
            url: url.to_string(),
            api_key_env: "TIDESYNC_TEST_UNSET_KEY".to_string(),
            timeout_secs: 5,
        }
    }

    #[test]
    fn test_upsert_rows_stamp_principal() {
        let todo = Todo::new("local", "buy milk", Utc.timestamp_opt(10, 0).unwrap());
        let rows = upsert_rows(&[Record::Todo(todo.clone())], &principal()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["user_id"], "alice");
        assert_eq!(rows[0]["id"], todo.id.as_str());
        assert_eq!(rows[0]["title"], "buy milk");
    }

    #[test]
    fn test_decode_rows_skips_malformed() {
        let rows = vec![
            serde_json::json!({ "id": "broken", "user_id": "alice" }),
            serde_json::json!({
                "id": "ok",
                "user_id": "alice",
                "title": "fine",
                "tags": null,
                "created_at": "2025-10-09T08:00:00Z",
                "updated_at": "2025-10-09T08:00:00Z"
            }),
        ];
        let records = decode_rows(Collection::Todos, rows);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id(), "ok");
    }

    #[test]
    fn test_fetch_query_filters_by_owner() {
        let query = fetch_query(&principal());
        assert!(query.contains(&("user_id", "eq.alice".to_string())));
        assert!(query.contains(&("order", "created_at.desc".to_string())));
    }

    #[test]
    fn test_table_url_strips_trailing_slash() {
        let remote =
            SupabaseRemote::with_api_key(&remote_config("https://x.supabase.co/"), "k".into())
                .unwrap();
        assert_eq!(
            remote.table_url(Collection::Knowledge),
            "https://x.supabase.co/rest/v1/knowledge_items"
        );
    }

    #[test]
    fn test_missing_api_key_is_an_error() {
        assert!(SupabaseRemote::new(&remote_config("https://x.supabase.co")).is_err());
    }

    #[test]
    fn test_connect_without_remote_is_disabled() {
        let cfg = Config::minimal("/tmp/unused.sqlite".into());
        assert_eq!(connect(&cfg).name(), "disabled");
    }
}
