//! Cache types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{self, Read};
use std::sync::Arc;
use std::time::Duration;

/// Outcome of a single `get` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchStats {
    pub fetch_duration: Duration,
    pub success: bool,
    pub cache_hit: bool,
    pub not_modified: bool,
    pub num_bytes_fetched: u64,
    pub num_bytes_cached: u64,
}

/// Cumulative statistics about a cache instance
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub fetches: u64,
    pub not_modified: u64,
    pub failures: u64,
}

/// Content transform applied to a freshly fetched artifact.
///
/// Receives a reader over the fetched bytes and returns a reader producing
/// the bytes to cache. Runs on a blocking thread.
pub type Transform =
    Arc<dyn Fn(Box<dyn Read + Send>) -> io::Result<Box<dyn Read + Send>> + Send + Sync>;

/// Build a [`Transform`] from a closure
pub fn transform<F>(f: F) -> Transform
where
    F: Fn(Box<dyn Read + Send>) -> io::Result<Box<dyn Read + Send>> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Receives download progress from a backend
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, bytes_so_far: u64, total: Option<u64>);
}

/// Per-call options for [`RemoteFileCache::get`](crate::RemoteFileCache::get).
///
/// The default refetches every time: reuse of a cached file is opt-in via
/// [`GetOptions::max_age`].
#[derive(Clone, Default)]
pub struct GetOptions {
    pub max_age: Option<Duration>,
    pub transform: Option<Transform>,
    pub progress: Option<Arc<dyn ProgressSink>>,
}

impl GetOptions {
    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    pub fn transform(mut self, transform: Transform) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Whether a file of the given age may be served without fetching
    pub(crate) fn is_fresh(&self, age: Duration) -> bool {
        self.max_age.is_some_and(|max_age| age < max_age)
    }
}

impl fmt::Debug for GetOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GetOptions")
            .field("max_age", &self.max_age)
            .field("transform", &self.transform.is_some())
            .field("progress", &self.progress.is_some())
            .finish()
    }
}
