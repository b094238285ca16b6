//! `SupabaseRemote` against a mock PostgREST server.
//!
//! The mock keeps one JSON table per collection, applies the `user_id=eq.`
//! filter, and upserts on `id`, which is all the adapter relies on.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use tempfile::TempDir;

use tidesync::app::App;
use tidesync::config::{Config, RemoteConfig};
use tidesync::records_cmd::{self, NewTodo};
use tidesync::remote::SupabaseRemote;
use tidesync::sqlite_store::SqliteStore;
use tidesync::{db, migrate};
use tidesync_core::clock::ManualClock;
use tidesync_core::models::Collection;
use tidesync_core::remote::StaticAuth;
use tidesync_core::store::{RecordStore, StatusLedger};
use tidesync_core::SyncError;

const API_KEY: &str = "anon-key";
const TOKEN: &str = "good-token";

#[derive(Clone, Default)]
struct MockState {
    tables: Arc<Mutex<HashMap<String, HashMap<String, Value>>>>,
    fail_with: Arc<Mutex<Option<StatusCode>>>,
}

impl MockState {
    fn rows(&self, table: &str) -> Vec<Value> {
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    fn insert(&self, table: &str, row: Value) {
        let id = row["id"].as_str().unwrap().to_string();
        self.tables
            .lock()
            .unwrap()
            .entry(table.to_string())
            .or_default()
            .insert(id, row);
    }

    fn fail(&self, status: Option<StatusCode>) {
        *self.fail_with.lock().unwrap() = status;
    }

    fn check(&self, headers: &HeaderMap) -> Result<(), (StatusCode, String)> {
        if let Some(status) = *self.fail_with.lock().unwrap() {
            return Err((status, "boom".to_string()));
        }
        let bearer = format!("Bearer {}", TOKEN);
        let authorized = headers.get("apikey").and_then(|v| v.to_str().ok()) == Some(API_KEY)
            && headers.get("authorization").and_then(|v| v.to_str().ok()) == Some(bearer.as_str());
        if authorized {
            Ok(())
        } else {
            Err((StatusCode::UNAUTHORIZED, "JWT expired".to_string()))
        }
    }
}

async fn upsert(
    State(state): State<MockState>,
    Path(table): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(rows): Json<Vec<Value>>,
) -> Result<StatusCode, (StatusCode, String)> {
    state.check(&headers)?;
    if query.get("on_conflict").map(String::as_str) != Some("id") {
        return Err((StatusCode::CONFLICT, "duplicate key".to_string()));
    }
    for row in rows {
        state.insert(&table, row);
    }
    Ok(StatusCode::CREATED)
}

async fn fetch(
    State(state): State<MockState>,
    Path(table): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Json<Vec<Value>>, (StatusCode, String)> {
    state.check(&headers)?;
    let owner = query
        .get("user_id")
        .and_then(|f| f.strip_prefix("eq."))
        .unwrap_or_default()
        .to_string();
    let rows = state
        .rows(&table)
        .into_iter()
        .filter(|row| row["user_id"] == owner.as_str())
        .collect();
    Ok(Json(rows))
}

async fn start_mock() -> (MockState, String) {
    let state = MockState::default();
    let app = Router::new()
        .route("/rest/v1/{table}", post(upsert).get(fetch))
        .with_state(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (state, format!("http://{}", addr))
}

struct Replica {
    _tmp: TempDir,
    app: App,
    clock: Arc<ManualClock>,
}

async fn replica(url: &str, token: &str) -> Replica {
    let tmp = TempDir::new().unwrap();
    let db_path = tmp.path().join("tide.sqlite");
    let pool = db::connect_path(&db_path).await.unwrap();
    migrate::apply(&pool).await.unwrap();

    let remote_config = RemoteConfig {
        url: url.to_string(),
        api_key_env: "UNUSED".to_string(),
        timeout_secs: 5,
    };
    let remote = SupabaseRemote::with_api_key(&remote_config, API_KEY.to_string()).unwrap();
    let clock = Arc::new(ManualClock::new(
        Utc.timestamp_opt(1_760_000_000, 0).unwrap(),
    ));
    let mut config = Config::minimal(db_path);
    config.remote = Some(remote_config);

    let app = App::with_parts(
        config,
        SqliteStore::new(pool),
        Arc::new(remote),
        Arc::new(StaticAuth::signed_in("alice", token)),
        clock.clone(),
    );
    Replica {
        _tmp: tmp,
        app,
        clock,
    }
}

#[tokio::test]
async fn test_push_and_pull_through_postgrest() {
    let (mock, url) = start_mock().await;
    let a = replica(&url, TOKEN).await;
    let b = replica(&url, TOKEN).await;

    let todo = records_cmd::add_todo(
        a.app.store.as_ref(),
        a.clock.as_ref(),
        "alice",
        NewTodo::titled("ship it"),
    )
    .await
    .unwrap();

    let report = a.app.orchestrator.full_sync(Collection::Todos).await.unwrap();
    assert_eq!(report.pushed, 1);
    let rows = mock.rows("todos");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["id"], todo.id.as_str());
    assert_eq!(rows[0]["user_id"], "alice");

    let report = b.app.orchestrator.pull(Collection::Todos).await.unwrap();
    assert_eq!(report.fetched, 1);
    assert_eq!(report.written, 1);
    assert_eq!(
        b.app.store.get_all(Collection::Todos).await.unwrap(),
        a.app.store.get_all(Collection::Todos).await.unwrap()
    );
    assert!(b
        .app
        .store
        .get_status(Collection::Todos)
        .await
        .unwrap()
        .last_sync
        .is_some());
}

#[tokio::test]
async fn test_rows_of_other_users_are_filtered() {
    let (mock, url) = start_mock().await;
    let a = replica(&url, TOKEN).await;
    mock.insert(
        "knowledge_items",
        json!({
            "id": "k-mallory",
            "user_id": "mallory",
            "title": "someone else's note",
            "created_at": "2025-10-09T08:00:00Z",
            "updated_at": "2025-10-09T08:00:00Z"
        }),
    );

    let report = a.app.orchestrator.pull(Collection::Knowledge).await.unwrap();
    assert_eq!(report.fetched, 0);
    assert!(a
        .app
        .store
        .get_all(Collection::Knowledge)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_rejected_token_is_not_authenticated() {
    let (mock, url) = start_mock().await;
    let a = replica(&url, "expired").await;
    records_cmd::add_todo(
        a.app.store.as_ref(),
        a.clock.as_ref(),
        "alice",
        NewTodo::titled("stays local"),
    )
    .await
    .unwrap();

    assert_eq!(
        a.app.orchestrator.full_sync(Collection::Todos).await,
        Err(SyncError::NotAuthenticated)
    );
    assert!(mock.rows("todos").is_empty());
    assert_eq!(a.app.store.get_all(Collection::Todos).await.unwrap().len(), 1);
    assert_eq!(
        a.app.store.get_status(Collection::Todos).await.unwrap().last_sync,
        None
    );
}

#[tokio::test]
async fn test_server_error_maps_to_remote_error() {
    let (mock, url) = start_mock().await;
    let a = replica(&url, TOKEN).await;
    mock.fail(Some(StatusCode::INTERNAL_SERVER_ERROR));

    let err = a.app.orchestrator.pull(Collection::Todos).await.unwrap_err();
    assert_eq!(
        err,
        SyncError::Remote {
            status: 500,
            message: "boom".to_string()
        }
    );
    assert!(err.is_retryable());

    mock.fail(None);
    assert!(a.app.orchestrator.pull(Collection::Todos).await.is_ok());
}

#[tokio::test]
async fn test_null_columns_decode_and_sync() {
    let (mock, url) = start_mock().await;
    let a = replica(&url, TOKEN).await;
    mock.insert(
        "todos",
        json!({
            "id": "web-1",
            "user_id": "alice",
            "title": "added from the web app",
            "description": null,
            "completed": null,
            "priority": null,
            "due_date": null,
            "tags": null,
            "knowledge_id": null,
            "created_at": "2025-10-09T08:00:00Z",
            "updated_at": "2025-10-09T08:00:00Z"
        }),
    );
    mock.insert(
        "knowledge_items",
        json!({
            "id": "web-k1",
            "user_id": "alice",
            "title": "saved link",
            "url": "https://example.com",
            "content": null,
            "summary": null,
            "keywords": null,
            "status": null,
            "created_at": "2025-10-09T08:00:00Z",
            "updated_at": "2025-10-09T08:00:00Z"
        }),
    );
    records_cmd::add_todo(
        a.app.store.as_ref(),
        a.clock.as_ref(),
        "alice",
        NewTodo::titled("local"),
    )
    .await
    .unwrap();

    let report = a.app.orchestrator.full_sync(Collection::Todos).await.unwrap();
    assert_eq!(report.pushed, 1);
    assert_eq!(report.written, 1);
    let web = a
        .app
        .store
        .get(Collection::Todos, "web-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(web.title(), "added from the web app");

    let report = a.app.orchestrator.pull(Collection::Knowledge).await.unwrap();
    assert_eq!(report.written, 1);
}

#[tokio::test]
async fn test_undecodable_row_is_skipped() {
    let (mock, url) = start_mock().await;
    let a = replica(&url, TOKEN).await;
    mock.insert("todos", json!({ "id": "broken", "user_id": "alice" }));
    records_cmd::add_todo(
        a.app.store.as_ref(),
        a.clock.as_ref(),
        "alice",
        NewTodo::titled("still syncs"),
    )
    .await
    .unwrap();

    let report = a.app.orchestrator.full_sync(Collection::Todos).await.unwrap();
    assert_eq!(report.pushed, 1);
    assert_eq!(report.fetched, 1);
    assert_eq!(mock.rows("todos").len(), 2);
    assert_eq!(a.app.store.get_all(Collection::Todos).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_unreachable_server_is_a_network_error() {
    // Nothing listens on the discard port.
    let a = replica("http://127.0.0.1:9", TOKEN).await;
    let err = a.app.orchestrator.pull(Collection::Todos).await.unwrap_err();
    assert!(matches!(err, SyncError::Network(_)));
}
