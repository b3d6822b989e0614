//! In-process mock of the three backend services.
//!
//! One axum router serves every endpoint under `/api`, so the same base URL
//! can be configured for central, search and updates.

#![allow(dead_code)]

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

/// `/9j/4AAQ` decodes to a JPEG SOI/APP0 prefix.
pub const JPEG_B64: &str = "/9j/4AAQ";

#[derive(Default)]
pub struct Mock {
    /// `POST /initialize` answers "initializing" this many times first.
    pub init_not_ready: usize,
    pub init_calls: AtomicUsize,
    pub status_calls: AtomicUsize,
    pub search_calls: AtomicUsize,
    pub progress_calls: AtomicUsize,
}

impl Mock {
    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

pub struct MockServer {
    pub base_url: String,
    pub mock: Arc<Mock>,
}

pub async fn spawn(mock: Mock) -> MockServer {
    let mock = Arc::new(mock);
    let app = Router::new()
        .route("/api/initialize", post(initialize))
        .route("/api/status", get(status))
        .route("/api/search", get(search))
        .route("/api/report/{hash}", get(report))
        .route("/api/check-for-updates", post(check_for_updates))
        .route("/api/progress", get(progress))
        .with_state(mock.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockServer {
        base_url: format!("http://{}/api", addr),
        mock,
    }
}

async fn initialize(State(mock): State<Arc<Mock>>) -> Json<Value> {
    let call = mock.init_calls.fetch_add(1, Ordering::SeqCst) + 1;
    if call > mock.init_not_ready {
        Json(json!({"status": "success"}))
    } else {
        Json(json!({"status": "initializing"}))
    }
}

async fn status(State(mock): State<Arc<Mock>>) -> Json<Value> {
    mock.status_calls.fetch_add(1, Ordering::SeqCst);
    Json(json!({"status": "ready"}))
}

/// `alpha` has 23 hits; `empty` has none; `boom` fails with a 500.
async fn search(
    State(mock): State<Arc<Mock>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, StatusCode> {
    mock.search_calls.fetch_add(1, Ordering::SeqCst);
    let query = params.get("query").cloned().unwrap_or_default();
    let page: u64 = params
        .get("page")
        .and_then(|p| p.parse().ok())
        .unwrap_or(1);

    let total_hits: u64 = match query.as_str() {
        "alpha" => 23,
        "empty" => 0,
        "boom" => return Err(StatusCode::INTERNAL_SERVER_ERROR),
        _ => 1,
    };

    let first = (page - 1) * 10;
    let count = total_hits.saturating_sub(first).min(10);
    let records: Vec<Value> = (0..count)
        .map(|i| record(&format!("{}-{}", query, first + i), (first + i) % 2 == 0))
        .collect();

    Ok(Json(json!({"records": records, "total_hits": total_hits})))
}

fn record(hash: &str, located: bool) -> Value {
    let mut r = json!({
        "SHA256_hash": hash,
        "file_path": format!("C:\\reports\\{}.docx", hash),
        "highest_classification": "UNCLASSIFIED",
        "locations": ["Kabul"],
        "MGRS": ["42SWD1234"],
        "full_text": format!("Report {} body text.", hash),
    });
    if located {
        r["lat"] = json!(34.5);
        r["lng"] = json!(69.2);
    }
    r
}

async fn report(Path(hash): Path<String>) -> Result<Json<Value>, StatusCode> {
    if hash == "missing" {
        return Err(StatusCode::NOT_FOUND);
    }
    let mut r = record(&hash, true);
    r["subjects"] = json!("logistics|fuel");
    r["keywords"] = json!("convoy,route");
    r["caveats"] = json!("none_found");
    r["processed_time"] = json!("2024-01-02T03:04:05");
    r["images"] = json!([JPEG_B64]);
    Ok(Json(r))
}

async fn check_for_updates() -> Json<Value> {
    Json(json!({"status": "started"}))
}

/// Three polls: two in progress, then `Completed`.
async fn progress(State(mock): State<Arc<Mock>>) -> Json<Value> {
    let call = mock.progress_calls.fetch_add(1, Ordering::SeqCst) as u64 + 1;
    let message = if call >= 3 { "Completed" } else { "Processing" };
    Json(json!({"current": call.min(3), "total": 3, "message": message}))
}

/// Write a config that points every service at `base_url`.
pub fn write_config(base_url: &str, timeout_secs: u64) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("core.toml");
    let content = format!(
        r#"[services.central]
url = "{base}"

[services.search]
url = "{base}"

[services.updates]
url = "{base}"

[readiness]
timeout_secs = {timeout}
retry_delay_ms = 20
request_timeout_secs = 2

[updates]
poll_interval_ms = 20
"#,
        base = base_url,
        timeout = timeout_secs
    );
    std::fs::write(&path, content).unwrap();
    (tmp, path)
}
