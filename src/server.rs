use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use axum::{
    extract::{Query, State},
    http::{header, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tower_http::{services::ServeDir, set_header::SetResponseHeaderLayer, trace::TraceLayer};
use tracing::{info, warn};

use crate::{
    ports::{self, Mode},
    scanner::{self, NetProber, ScanOptions, SharedProgress},
    types::{Endpoint, ScanResults},
};

#[derive(Clone)]
pub struct AppState {
    inner: Arc<RwLock<ServerState>>,
    progress: SharedProgress,
    defaults: ScanOptions,
}

#[derive(Debug, Default)]
struct ServerState {
    host: String,
    total: u64,
    results: Option<ScanResults>,
    cancel: Option<CancellationToken>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct Status {
    pub host: String,
    pub total: u64,
    pub checked: u64,
    pub open: u64,
    pub state: String, // "idle" | "running" | "done"
}

#[derive(Debug, Deserialize)]
pub struct EndpointsQuery {
    #[serde(default)]
    pub mode: Mode,
}

#[derive(Debug, Deserialize)]
pub struct CustomEndpoint {
    pub port: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    pub host: String,
    #[serde(default)]
    pub mode: Mode,
    /// Replaces the built-in table for `mode` when non-empty.
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
    #[serde(default)]
    pub custom: Vec<CustomEndpoint>,
    #[serde(default)]
    pub attempts: Option<usize>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub banner: Option<bool>,
}

impl AppState {
    pub fn new(defaults: ScanOptions) -> Self {
        Self {
            inner: Arc::new(RwLock::new(ServerState::default())),
            progress: SharedProgress::new(),
            defaults,
        }
    }

    pub fn progress(&self) -> &SharedProgress {
        &self.progress
    }
}

/// API routes plus the static UI fallback.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/endpoints", get(get_endpoints))
        .route("/status", get(get_status))
        .route("/scan", post(post_scan))
        .route("/cancel", post(post_cancel))
        .route("/results", get(get_results))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .with_state(state);

    let static_svc = ServeDir::new("ui").append_index_html_on_directories(true);

    Router::new()
        .nest("/api", api)
        .fallback_service(static_svc)
        .layer(TraceLayer::new_for_http())
}

pub async fn spawn_server(bind: &str, defaults: ScanOptions) -> Result<()> {
    let app = router(AppState::new(defaults));
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;

    info!("serving UI on http://{}", bind);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn get_endpoints(Query(q): Query<EndpointsQuery>) -> impl IntoResponse {
    Json(ports::default_endpoints(q.mode))
}

async fn get_status(State(app): State<AppState>) -> impl IntoResponse {
    let s = app.inner.read().await;
    let running = app.progress.is_running();
    let state = if running {
        "running"
    } else if s.results.is_some() {
        "done"
    } else {
        "idle"
    };
    let out = Status {
        host: s.host.clone(),
        total: s.total,
        checked: app.progress.checked_count.load(std::sync::atomic::Ordering::Relaxed),
        open: app.progress.open_count.load(std::sync::atomic::Ordering::Relaxed),
        state: state.into(),
    };
    (StatusCode::OK, Json(out))
}

async fn get_results(State(app): State<AppState>) -> impl IntoResponse {
    let s = app.inner.read().await;
    match s.results.as_ref() {
        Some(res) if !app.progress.is_running() => (StatusCode::OK, Json(res.clone())).into_response(),
        _ => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn post_cancel(State(app): State<AppState>) -> impl IntoResponse {
    let s = app.inner.read().await;
    match s.cancel.as_ref() {
        Some(c) if app.progress.is_running() => {
            c.cancel();
            StatusCode::ACCEPTED
        }
        _ => StatusCode::CONFLICT,
    }
}

async fn post_scan(State(app): State<AppState>, Json(req): Json<ScanRequest>) -> impl IntoResponse {
    let host = req.host.trim().to_string();
    if host.is_empty() {
        return (StatusCode::BAD_REQUEST, "Target host is required.".to_string()).into_response();
    }

    let mut endpoints = if req.endpoints.is_empty() {
        ports::default_endpoints(req.mode)
    } else {
        match ports::validate_endpoints(req.endpoints) {
            Ok(list) => list,
            Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
        }
    };
    for c in &req.custom {
        if let Err(e) = ports::add_custom_endpoint(&mut endpoints, &c.port, &c.name) {
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    }
    if endpoints.is_empty() {
        return (StatusCode::BAD_REQUEST, "No ports configured.".to_string()).into_response();
    }

    let mut opts = app.defaults.clone();
    if let Some(a) = req.attempts {
        opts.attempts = a.clamp(1, 10);
    }
    if let Some(t) = req.timeout_ms {
        opts.attempt_timeout = Duration::from_millis(t.clamp(50, 30_000));
    }
    if let Some(b) = req.banner {
        opts.read_banner = b;
    }

    // Callers must serialize scans; a second one is rejected, not queued.
    if !app.progress.try_begin() {
        warn!(host = %host, "scan rejected: another scan is running");
        return (StatusCode::CONFLICT, "A scan is already running.".to_string()).into_response();
    }

    let total = endpoints.len() as u64;
    let cancel = CancellationToken::new();
    {
        let mut s = app.inner.write().await;
        s.host = host.clone();
        s.total = total;
        s.results = None;
        s.cancel = Some(cancel.clone());
    }

    let app2 = app.clone();
    let host2 = host.clone();
    tokio::spawn(async move {
        let results = scanner::scan_with(
            &NetProber,
            &host2,
            &endpoints,
            &opts,
            cancel,
            app2.progress.clone(),
        )
        .await;

        // Results and cancel handle must be settled before the flag clears.
        let mut s = app2.inner.write().await;
        s.results = Some(results);
        s.cancel = None;
        app2.progress.finish();
    });

    let status = Status {
        host,
        total,
        checked: 0,
        open: 0,
        state: "running".into(),
    };
    (StatusCode::ACCEPTED, Json(status)).into_response()
}
