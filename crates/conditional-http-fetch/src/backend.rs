//! HTTP fetch backend with conditional revalidation

use crate::config::HttpBackendConfig;
use crate::error::Result;
use async_trait::async_trait;
use remote_file_cache::{FetchBackend, FetchError, FetchRequest};
use reqwest::header::{HeaderMap, ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use reqwest::{Client, Response, StatusCode};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use url::Url;

/// Fetches URLs with plain HTTP GET, remembering `ETag` and
/// `Last-Modified` per URL so later fetches can be answered with 304.
pub struct ConditionalHttpFetchBackend {
    client: Client,
    etags: RwLock<HashMap<String, String>>,
    last_modified: RwLock<HashMap<String, String>>,
}

impl ConditionalHttpFetchBackend {
    pub fn new(config: &HttpBackendConfig) -> Result<Self> {
        Ok(Self::with_client(config.build_client()?))
    }

    /// Use a preconfigured client. Its timeouts apply to every fetch.
    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            etags: RwLock::new(HashMap::new()),
            last_modified: RwLock::new(HashMap::new()),
        }
    }

    /// The `ETag` remembered for `url`
    pub async fn etag(&self, url: &str) -> Option<String> {
        self.etags.read().await.get(url).cloned()
    }

    /// The `Last-Modified` value remembered for `url`
    pub async fn last_modified(&self, url: &str) -> Option<String> {
        self.last_modified.read().await.get(url).cloned()
    }

    async fn remember(&self, url: &str, headers: &HeaderMap) {
        update(&self.etags, url, header_value(headers, ETAG)).await;
        update(
            &self.last_modified,
            url,
            header_value(headers, LAST_MODIFIED),
        )
        .await;
    }

    async fn forget(&self, url: &str) {
        update(&self.etags, url, None).await;
        update(&self.last_modified, url, None).await;
    }

    /// Stream the response body into `path`, returning the byte count
    async fn download(
        &self,
        mut response: Response,
        path: &Path,
        request: &FetchRequest<'_>,
    ) -> std::result::Result<u64, FetchError> {
        let total = response.content_length();
        let mut file = fs::File::create(path).await?;
        let mut written = 0u64;

        while let Some(chunk) = response.chunk().await.map_err(FetchError::transport)? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
            request.report_progress(written, total);
        }

        file.flush().await?;
        Ok(written)
    }
}

#[async_trait]
impl FetchBackend for ConditionalHttpFetchBackend {
    async fn fetch(&self, request: FetchRequest<'_>) -> std::result::Result<PathBuf, FetchError> {
        let url = Url::parse(request.identifier).map_err(|e| {
            FetchError::InvalidIdentifier(format!("{}: {}", request.identifier, e))
        })?;

        // Revalidate only a file we can still hand back on 304
        let cached = match request.existing {
            Some(existing) if fs::try_exists(existing).await.unwrap_or(false) => Some(existing),
            _ => None,
        };

        let mut req = self.client.get(url.clone());
        if cached.is_some() {
            if let Some(last_modified) = self.last_modified(request.identifier).await {
                req = req.header(IF_MODIFIED_SINCE, last_modified);
            }
            if let Some(etag) = self.etag(request.identifier).await {
                req = req.header(IF_NONE_MATCH, etag);
            }
        }

        debug!(url = %url, conditional = cached.is_some(), "Fetching remote file");
        let response = req.send().await.map_err(FetchError::transport)?;
        let status = response.status();

        if status == StatusCode::NOT_MODIFIED {
            if let Some(existing) = cached {
                debug!(url = %url, elapsed = ?request.started_at.elapsed(), "Content not modified");
                return Ok(existing.to_path_buf());
            }
            warn!(url = %url, "Server returned 304 but there is no cached file");
            self.forget(request.identifier).await;
            return Err(FetchError::NotModifiedWithoutCache);
        }

        if !status.is_success() {
            warn!(status = %status, url = %url, "Failed to fetch remote file");
            return Err(FetchError::Status(status.as_u16()));
        }

        let headers = response.headers().clone();
        let path = request.new_writable_path()?;
        let size = match self.download(response, &path, &request).await {
            Ok(size) => size,
            Err(err) => {
                if let Err(e) = fs::remove_file(&path).await {
                    warn!(path = ?path, error = %e, "Failed to remove partial download");
                }
                return Err(err);
            }
        };

        self.remember(request.identifier, &headers).await;

        debug!(
            url = %url,
            size,
            elapsed = ?request.started_at.elapsed(),
            "Downloaded remote file"
        );
        Ok(path)
    }
}

fn header_value(headers: &HeaderMap, name: reqwest::header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

/// Store `value` for `url`, or forget it when the server stopped sending it
async fn update(memory: &RwLock<HashMap<String, String>>, url: &str, value: Option<String>) {
    let mut memory = memory.write().await;
    match value {
        Some(value) => {
            memory.insert(url.to_string(), value);
        }
        None => {
            memory.remove(url);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{spawn_upstream, Seen, FONT_BYTES, LAST_MODIFIED};
    use remote_file_cache::{transform, CacheError, GetOptions, ProgressSink, RemoteFileCache};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn cache() -> RemoteFileCache<ConditionalHttpFetchBackend> {
        let backend = ConditionalHttpFetchBackend::new(&HttpBackendConfig::default()).unwrap();
        RemoteFileCache::new("http-test", backend).unwrap()
    }

    #[tokio::test]
    async fn test_etag_revalidation() {
        let seen = Seen::default();
        let base = spawn_upstream(seen.clone()).await;
        let url = format!("{}/font.woff2", base);
        let cache = cache();
        let options = GetOptions::default().max_age(Duration::ZERO);

        let (first, stats) = cache.get_with_stats(&url, options.clone()).await.unwrap();
        assert!(!stats.not_modified);
        assert_eq!(stats.num_bytes_fetched, FONT_BYTES.len() as u64);
        assert_eq!(std::fs::read(&first).unwrap(), FONT_BYTES);
        assert_eq!(cache.backend().etag(&url).await.as_deref(), Some("\"v1\""));

        let (second, stats) = cache.get_with_stats(&url, options).await.unwrap();
        assert_eq!(first, second);
        assert!(stats.success);
        assert!(stats.not_modified);

        let requests = seen.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0], (None, None));
        assert_eq!(requests[1].0.as_deref(), Some("\"v1\""));
        assert_eq!(requests[1].1.as_deref(), Some(LAST_MODIFIED));
    }

    #[tokio::test]
    async fn test_vanished_file_is_downloaded_unconditionally() {
        let seen = Seen::default();
        let base = spawn_upstream(seen.clone()).await;
        let url = format!("{}/font.woff2", base);
        let cache = cache();
        let options = GetOptions::default().max_age(Duration::from_secs(60 * 60));

        let first = cache.get(&url, options.clone()).await.unwrap();
        std::fs::remove_file(&first).unwrap();

        let (second, stats) = cache.get_with_stats(&url, options).await.unwrap();
        assert!(stats.success);
        assert!(!stats.not_modified);
        assert_eq!(std::fs::read(&second).unwrap(), FONT_BYTES);
        assert_eq!(seen.requests(), vec![(None, None), (None, None)]);
    }

    #[tokio::test]
    async fn test_download_after_failed_transform() {
        let seen = Seen::default();
        let base = spawn_upstream(seen.clone()).await;
        let url = format!("{}/font.woff2", base);
        let cache = cache();
        let rejecting = transform(|_input| Err(std::io::Error::other("rejected")));

        let err = cache
            .get(&url, GetOptions::default().transform(rejecting))
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::Transform(_)));

        let (path, stats) = cache.get_with_stats(&url, GetOptions::default()).await.unwrap();
        assert!(!stats.not_modified);
        assert_eq!(std::fs::read(&path).unwrap(), FONT_BYTES);
        assert_eq!(seen.requests(), vec![(None, None), (None, None)]);

        // Now there is a file to revalidate
        let (again, stats) = cache.get_with_stats(&url, GetOptions::default()).await.unwrap();
        assert_eq!(again, path);
        assert!(stats.not_modified);
        assert_eq!(seen.requests()[2].0.as_deref(), Some("\"v1\""));
    }

    #[tokio::test]
    async fn test_forgets_headers_the_server_stopped_sending() {
        let seen = Seen::default();
        let base = spawn_upstream(seen.clone()).await;
        let url = format!("{}/forgetful", base);
        let cache = cache();

        cache.get(&url, GetOptions::default()).await.unwrap();
        assert_eq!(cache.backend().etag(&url).await.as_deref(), Some("\"once\""));

        let (_, stats) = cache.get_with_stats(&url, GetOptions::default()).await.unwrap();
        assert!(!stats.not_modified);
        assert_eq!(cache.backend().etag(&url).await, None);
        assert_eq!(cache.backend().last_modified(&url).await, None);

        let requests = seen.requests();
        assert_eq!(requests[1].0.as_deref(), Some("\"once\""));
    }

    #[tokio::test]
    async fn test_not_modified_without_cached_file_fails() {
        let base = spawn_upstream(Seen::default()).await;
        let cache = cache();

        let err = cache
            .get_with_stats(&format!("{}/stale", base), GetOptions::default())
            .await
            .unwrap_err();

        assert!(!err.stats.success);
        assert!(err.stats.not_modified);
        assert!(matches!(
            err.cause,
            CacheError::Fetch(FetchError::NotModifiedWithoutCache)
        ));
    }

    #[tokio::test]
    async fn test_error_status_fails() {
        let base = spawn_upstream(Seen::default()).await;
        let cache = cache();

        let err = cache
            .get(&format!("{}/missing", base), GetOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, CacheError::Fetch(FetchError::Status(404))));
        assert_eq!(std::fs::read_dir(cache.scratch_dir()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_url_is_input_error() {
        let cache = cache();

        let err = cache.get("not a url", GetOptions::default()).await.unwrap_err();
        match err {
            CacheError::Fetch(fetch) => assert!(fetch.is_input_error()),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_read_timeout_is_a_fetch_failure() {
        let base = spawn_upstream(Seen::default()).await;
        let config = HttpBackendConfig::default().read_timeout(Duration::from_millis(200));
        let backend = ConditionalHttpFetchBackend::new(&config).unwrap();
        let cache = RemoteFileCache::new("timeout-test", backend).unwrap();

        let err = cache
            .get_with_stats(&format!("{}/slow", base), GetOptions::default())
            .await
            .unwrap_err();

        assert!(!err.stats.success);
        assert!(matches!(err.cause, CacheError::Fetch(FetchError::Transport(_))));
    }

    #[tokio::test]
    async fn test_reports_download_progress() {
        struct Progress(AtomicU64, AtomicU64);

        impl ProgressSink for Progress {
            fn on_progress(&self, bytes_so_far: u64, total: Option<u64>) {
                self.0.store(bytes_so_far, Ordering::SeqCst);
                self.1.store(total.unwrap_or(0), Ordering::SeqCst);
            }
        }

        let base = spawn_upstream(Seen::default()).await;
        let cache = cache();
        let progress = Arc::new(Progress(AtomicU64::new(0), AtomicU64::new(0)));

        cache
            .get(
                &format!("{}/font.woff2", base),
                GetOptions::default().progress(progress.clone()),
            )
            .await
            .unwrap();

        assert_eq!(progress.0.load(Ordering::SeqCst), FONT_BYTES.len() as u64);
        assert_eq!(progress.1.load(Ordering::SeqCst), FONT_BYTES.len() as u64);
    }
}
