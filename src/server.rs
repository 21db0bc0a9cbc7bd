use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::{
    config::{ScanOptions, DEFAULT_CONCURRENCY, DEFAULT_TIMEOUT_SECS},
    ports,
    scanner::{self, SharedProgress},
    types::ScanReport,
};

#[derive(Clone, Default)]
pub struct AppState {
    inner: Arc<RwLock<ServerState>>, // shared mutable state for progress/results
}

#[derive(Debug, Default)]
struct ServerState {
    status: Status,
    results: Option<ScanReport>,
    progress: Option<SharedProgress>,
    cancel: Option<CancellationToken>,
    generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScanPhase {
    #[default]
    Idle,
    Running,
    Done,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Status {
    pub total: u64,
    pub scanned: u64,
    pub open: u64,
    pub state: ScanPhase,
}

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    pub target: String,
    /// Port specification, e.g. `22,80,8000-8100`.
    pub ports: String,
    #[serde(default)]
    pub timeout_secs: Option<f64>,
    #[serde(default)]
    pub concurrency: Option<usize>,
    #[serde(default)]
    pub banner: bool,
}

/// Build the API router around `state`.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/status", get(get_status))
        .route("/scan", post(post_scan))
        .route("/results", get(get_results))
        .with_state(state);

    Router::new()
        .nest("/api", api)
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
}

pub async fn spawn_server(bind: &str) -> Result<()> {
    let app = router(AppState::default());
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("serving scan API on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn get_status(State(app): State<AppState>) -> impl IntoResponse {
    let s = app.inner.read().await;
    let (scanned, open) = match s.progress.as_ref() {
        Some(p) => (p.scanned(), p.open()),
        None => (s.status.scanned, s.status.open),
    };
    let out = Status { total: s.status.total, scanned, open, state: s.status.state };
    (StatusCode::OK, Json(out))
}

async fn get_results(State(app): State<AppState>) -> impl IntoResponse {
    let s = app.inner.read().await;
    match s.results.as_ref() {
        Some(res) => (StatusCode::OK, Json(res.clone())).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn post_scan(State(app): State<AppState>, Json(req): Json<ScanRequest>) -> impl IntoResponse {
    let target = req.target.trim().to_string();
    if target.is_empty() {
        return (StatusCode::BAD_REQUEST, "target is empty".to_string()).into_response();
    }
    let ports = match ports::parse_port_spec(&req.ports) {
        Ok(p) => p,
        Err(e) => return (StatusCode::BAD_REQUEST, e.message).into_response(),
    };
    let opts = match ScanOptions::from_secs(
        req.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
        req.concurrency.unwrap_or(DEFAULT_CONCURRENCY),
        req.banner,
    ) {
        Ok(o) => o,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };

    let total = ports.len() as u64;
    let progress = SharedProgress::new();
    let cancel = CancellationToken::new();
    let running = Status { total, scanned: 0, open: 0, state: ScanPhase::Running };

    let generation = {
        let mut s = app.inner.write().await;
        // Cancel any existing scan
        if let Some(c) = s.cancel.take() {
            c.cancel();
        }
        s.generation += 1;
        s.status = running.clone();
        s.results = None;
        s.progress = Some(progress.clone());
        s.cancel = Some(cancel.clone());
        s.generation
    };

    let app2 = app.clone();
    tokio::spawn(async move {
        let report =
            scanner::scan_target(&target, &ports, &opts, cancel, Some(progress)).await;

        let mut s = app2.inner.write().await;
        // A newer request replaced this scan; its results are stale.
        if s.generation != generation {
            warn!("discarding results of superseded scan of {target}");
            return;
        }
        s.status.scanned = report.scanned_done;
        s.status.open = report.summary.open;
        s.status.state = ScanPhase::Done;
        s.results = Some(report);
        s.progress = None;
        s.cancel = None;
    });

    (StatusCode::ACCEPTED, Json(running)).into_response()
}
