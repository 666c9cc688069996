#![allow(dead_code)]

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use rusqlite::{params, Connection};
use serde_json::json;
use std::path::Path;
use std::sync::{Arc, Mutex};

use memrelay::config::SyncConfig;
use memrelay::sync::client::SyncClient;

/// Create the upstream application's schema in a fresh database file.
pub fn create_upstream_db(path: &Path) -> Connection {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(
        "CREATE TABLE observations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            memory_session_id TEXT,
            type TEXT,
            title TEXT,
            subtitle TEXT,
            text TEXT,
            project TEXT,
            facts TEXT,
            concepts TEXT,
            files TEXT,
            prompt_number INTEGER,
            tokens INTEGER,
            created_at TEXT,
            created_at_epoch INTEGER
        );
        CREATE TABLE session_summaries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            memory_session_id TEXT,
            request TEXT,
            investigated TEXT,
            learned TEXT,
            completed TEXT,
            next_steps TEXT,
            notes TEXT,
            created_at TEXT,
            created_at_epoch INTEGER
        );
        CREATE TABLE sdk_sessions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            memory_session_id TEXT UNIQUE,
            started_at TEXT
        );",
    )
    .unwrap();
    conn
}

/// Insert an observation as the upstream writer would. Returns its id.
pub fn insert_observation(conn: &Connection, session: &str, title: &str) -> i64 {
    conn.execute(
        "INSERT INTO observations (memory_session_id, type, title, facts, concepts, files, prompt_number, tokens, created_at, created_at_epoch) \
         VALUES (?1, 'observation', ?2, '[]', '[]', '[]', 1, 50, '2026-08-04T12:00:00Z', 1786190400)",
        params![session, title],
    )
    .unwrap();
    conn.last_insert_rowid()
}

/// Insert a session summary as the upstream writer would. Returns its id.
pub fn insert_summary(conn: &Connection, session: &str, request: &str) -> i64 {
    conn.execute(
        "INSERT INTO session_summaries (memory_session_id, request, created_at, created_at_epoch) \
         VALUES (?1, ?2, '2026-08-04T13:00:00Z', 1786194000)",
        params![session, request],
    )
    .unwrap();
    conn.last_insert_rowid()
}

/// How the fake push endpoint answers.
#[derive(Debug, Clone, Copy)]
pub enum ServerMode {
    /// 2xx with full `inserted` counts.
    Accept,
    /// Non-2xx with the given status code.
    Reject(u16),
    /// 5xx for multi-record observation batches, 2xx for single records.
    /// Exercises the per-record fallback path.
    RejectBatches,
}

#[derive(Debug)]
pub struct ServerState {
    pub requests: Mutex<Vec<serde_json::Value>>,
    pub mode: Mutex<ServerMode>,
}

/// In-process stand-in for the remote memory service.
pub struct FakeServer {
    pub state: Arc<ServerState>,
    pub url: String,
}

impl FakeServer {
    pub async fn spawn() -> Self {
        let state = Arc::new(ServerState {
            requests: Mutex::new(Vec::new()),
            mode: Mutex::new(ServerMode::Accept),
        });

        let app = Router::new()
            .route("/api/sync/push", post(handle_push))
            .route("/api/health", get(|| async { "ok" }))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            state,
            url: format!("http://{addr}"),
        }
    }

    pub fn set_mode(&self, mode: ServerMode) {
        *self.state.mode.lock().unwrap() = mode;
    }

    pub fn request_count(&self) -> usize {
        self.state.requests.lock().unwrap().len()
    }

    /// Observation ids seen across all accepted and rejected requests.
    pub fn observation_ids_seen(&self) -> Vec<i64> {
        self.state
            .requests
            .lock()
            .unwrap()
            .iter()
            .flat_map(|body| {
                body.get("observations")
                    .and_then(|v| v.as_array())
                    .map(|records| {
                        records
                            .iter()
                            .filter_map(|r| r.get("id").and_then(|id| id.as_i64()))
                            .collect::<Vec<_>>()
                    })
                    .unwrap_or_default()
            })
            .collect()
    }
}

async fn handle_push(
    State(state): State<Arc<ServerState>>,
    Json(body): Json<serde_json::Value>,
) -> axum::response::Response {
    state.requests.lock().unwrap().push(body.clone());

    let mode = *state.mode.lock().unwrap();
    match mode {
        ServerMode::Accept => accept_response(&body),
        ServerMode::Reject(code) => {
            let status = StatusCode::from_u16(code).unwrap();
            (status, "simulated failure").into_response()
        }
        ServerMode::RejectBatches => {
            let batch_len = body
                .get("observations")
                .and_then(|v| v.as_array())
                .map(|a| a.len())
                .unwrap_or(0);
            if batch_len > 1 {
                (StatusCode::INTERNAL_SERVER_ERROR, "batch rejected").into_response()
            } else {
                accept_response(&body)
            }
        }
    }
}

fn accept_response(body: &serde_json::Value) -> axum::response::Response {
    let mut response = serde_json::Map::new();
    if let Some(records) = body.get("observations").and_then(|v| v.as_array()) {
        response.insert(
            "observations".into(),
            json!({ "inserted": records.len(), "updated": 0 }),
        );
    }
    if let Some(records) = body.get("summaries").and_then(|v| v.as_array()) {
        response.insert(
            "summaries".into(),
            json!({ "inserted": records.len(), "updated": 0 }),
        );
    }
    (StatusCode::OK, Json(serde_json::Value::Object(response))).into_response()
}

/// A configured client pointed at the given server URL.
pub fn test_client(server_url: &str) -> SyncClient {
    SyncClient::new(SyncConfig {
        api_key: "test-key".into(),
        server_url: server_url.into(),
        sync_enabled: true,
        ..SyncConfig::default()
    })
}
