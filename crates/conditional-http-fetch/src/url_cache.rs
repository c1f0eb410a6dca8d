//! Purpose-named cache of files downloaded by URL

use crate::backend::ConditionalHttpFetchBackend;
use crate::config::HttpBackendConfig;
use crate::error::Result;
use remote_file_cache::{CacheFetchError, CacheStats, FetchStats, GetOptions, RemoteFileCache};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A [`RemoteFileCache`] over HTTP, named for what it holds
/// (for example `"fonts"` or `"downloaded-icons"`).
pub struct UrlFileCache {
    cache: RemoteFileCache<ConditionalHttpFetchBackend>,
}

impl UrlFileCache {
    pub fn new(purpose: &str, config: &HttpBackendConfig) -> Result<Self> {
        let backend = ConditionalHttpFetchBackend::new(config)?;
        Ok(Self {
            cache: RemoteFileCache::new(purpose, backend)?,
        })
    }

    /// Like [`UrlFileCache::new`], with the scratch directory inside `parent`
    pub fn new_in(parent: &Path, purpose: &str, config: &HttpBackendConfig) -> Result<Self> {
        let backend = ConditionalHttpFetchBackend::new(config)?;
        Ok(Self {
            cache: RemoteFileCache::new_in(parent, purpose, backend)?,
        })
    }

    pub fn purpose(&self) -> &str {
        self.cache.name()
    }

    /// Local copy of `url`, reused while younger than `max_age`
    pub async fn get(
        &self,
        url: &str,
        max_age: Option<Duration>,
    ) -> remote_file_cache::Result<PathBuf> {
        let options = GetOptions {
            max_age,
            ..GetOptions::default()
        };
        self.cache.get(url, options).await
    }

    /// Local copy of `url` with full control over freshness, transform and
    /// progress reporting
    pub async fn get_with_options(
        &self,
        url: &str,
        options: GetOptions,
    ) -> remote_file_cache::Result<PathBuf> {
        self.cache.get(url, options).await
    }

    pub async fn get_with_stats(
        &self,
        url: &str,
        options: GetOptions,
    ) -> std::result::Result<(PathBuf, FetchStats), CacheFetchError> {
        self.cache.get_with_stats(url, options).await
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn dispose(self) -> remote_file_cache::Result<()> {
        self.cache.dispose()
    }
}
