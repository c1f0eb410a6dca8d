//! HTTP server for proxy endpoints
//!
//! Provides /health and /fetch?url=...&max_age_secs=... endpoints.

use crate::types::{FetchQuery, HealthResponse, ProxyConfig};
use axum::{
    extract::{Query, State},
    http::{header, HeaderName, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use conditional_http_fetch::UrlFileCache;
use remote_file_cache::{CacheError, FetchStats, GetOptions};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

/// Shared state for the HTTP server
pub struct ServerState {
    pub cache: UrlFileCache,
    pub config: ProxyConfig,
    pub started_at: DateTime<Utc>,
}

impl ServerState {
    pub fn new(cache: UrlFileCache, config: ProxyConfig) -> Self {
        Self {
            cache,
            config,
            started_at: Utc::now(),
        }
    }
}

pub type SharedState = Arc<ServerState>;

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Create the HTTP router
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/fetch", get(fetch_file))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the HTTP server and run until Ctrl-C
pub async fn start_server(state: SharedState, port: u16) -> std::io::Result<()> {
    let router = create_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Health check endpoint
async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let uptime_secs = (Utc::now() - state.started_at).num_seconds().max(0) as u64;

    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs,
        purpose: state.cache.purpose().to_string(),
        cache: state.cache.stats(),
    })
}

/// Serve the cached copy of a remote file
async fn fetch_file(State(state): State<SharedState>, Query(query): Query<FetchQuery>) -> Response {
    let max_age = query
        .max_age_secs
        .map(Duration::from_secs)
        .unwrap_or_else(|| state.config.default_max_age());

    let (path, stats) = match state
        .cache
        .get_with_stats(&query.url, GetOptions::default().max_age(max_age))
        .await
    {
        Ok(result) => result,
        Err(err) => {
            warn!(url = %query.url, error = %err, "Failed to fetch remote file");
            let status = match &err.cause {
                CacheError::Fetch(fetch) if fetch.is_input_error() => StatusCode::BAD_REQUEST,
                _ => StatusCode::BAD_GATEWAY,
            };
            return error_response(status, err.cause.to_string());
        }
    };

    match tokio::fs::read(&path).await {
        Ok(data) => (
            [
                (header::CONTENT_TYPE, "application/octet-stream"),
                (HeaderName::from_static("x-cache"), cache_status(&stats)),
            ],
            data,
        )
            .into_response(),
        Err(e) => {
            let status = read_failure_status(&e);
            error!(url = %query.url, path = ?path, error = %e, "Failed to read cached file");
            error_response(status, "Cached file unavailable")
        }
    }
}

/// A concurrent refetch may have replaced and deleted the file between the
/// cache lookup and the read
fn read_failure_status(err: &std::io::Error) -> StatusCode {
    if err.kind() == std::io::ErrorKind::NotFound {
        StatusCode::BAD_GATEWAY
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

fn cache_status(stats: &FetchStats) -> &'static str {
    if stats.cache_hit {
        "HIT"
    } else if stats.not_modified {
        "REVALIDATED"
    } else {
        "MISS"
    }
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}
