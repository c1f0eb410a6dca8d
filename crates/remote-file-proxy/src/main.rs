//! Remote File Proxy - serves remote files through a revalidating disk cache
//!
//! Every distinct URL is downloaded at most once at a time, reused while
//! fresh, and revalidated with ETag / Last-Modified once stale.

mod error;
mod server;
mod types;

use crate::error::{ProxyError, Result};
use crate::server::{start_server, ServerState, SharedState};
use crate::types::ProxyConfig;
use conditional_http_fetch::{HttpBackendConfig, UrlFileCache};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let env_filter =
        EnvFilter::from_default_env().add_directive("remote_file_proxy=info".parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    };

    info!("Starting remote file proxy...");

    let config = load_config();
    info!("Port: {}", config.port);
    info!("Cache purpose: {}", config.cache_purpose);
    info!(
        "Timeouts: connect {}s, read {}s",
        config.connect_timeout_secs, config.read_timeout_secs
    );
    info!("Default max age: {} seconds", config.default_max_age_secs);

    let backend_config = HttpBackendConfig::default()
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .read_timeout(Duration::from_secs(config.read_timeout_secs));
    let cache = UrlFileCache::new(&config.cache_purpose, &backend_config)?;

    let port = config.port;
    let state: SharedState = Arc::new(ServerState::new(cache, config));

    // Start HTTP server (blocking until shutdown)
    start_server(state.clone(), port)
        .await
        .map_err(|e| ProxyError::Config(format!("Server error: {}", e)))?;

    match Arc::try_unwrap(state) {
        Ok(state) => {
            state.cache.dispose()?;
            info!("Cache disposed");
        }
        Err(_) => warn!("Cache still in use at shutdown, leaving cleanup to drop"),
    }

    Ok(())
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse::<T>().ok())
        .unwrap_or(default)
}

fn load_config() -> ProxyConfig {
    let defaults = ProxyConfig::default();

    ProxyConfig {
        port: env_or("PORT", defaults.port),
        cache_purpose: std::env::var("CACHE_PURPOSE").unwrap_or(defaults.cache_purpose),
        connect_timeout_secs: env_or("CONNECT_TIMEOUT_SECS", defaults.connect_timeout_secs),
        read_timeout_secs: env_or("READ_TIMEOUT_SECS", defaults.read_timeout_secs),
        default_max_age_secs: env_or("DEFAULT_MAX_AGE_SECS", defaults.default_max_age_secs),
    }
}
