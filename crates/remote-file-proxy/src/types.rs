//! Core types for the remote file proxy

use remote_file_cache::CacheStats;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the proxy service
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub port: u16,
    pub cache_purpose: String,
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
    /// Used when a request does not specify `max_age_secs`
    pub default_max_age_secs: u64,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            port: 3002,
            cache_purpose: "remote-files".to_string(),
            connect_timeout_secs: 10,
            read_timeout_secs: 30,
            default_max_age_secs: 60 * 60, // 1 hour
        }
    }
}

impl ProxyConfig {
    pub fn default_max_age(&self) -> Duration {
        Duration::from_secs(self.default_max_age_secs)
    }
}

/// Query parameters for `/fetch`
#[derive(Debug, Deserialize)]
pub struct FetchQuery {
    pub url: String,
    pub max_age_secs: Option<u64>,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub purpose: String,
    pub cache: CacheStats,
}
