//! Read-through file cache with single-flight fetches

use crate::backend::{FetchBackend, FetchRequest};
use crate::error::{CacheError, CacheFetchError, Result};
use crate::scratch::ScratchDir;
use crate::types::{CacheStats, FetchStats, GetOptions, Transform};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant, SystemTime};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// A cache of remote files stored in a private scratch directory.
///
/// All fetches, for any identifier, are serialized through one mutex that
/// also guards the identifier map. This guarantees at most one in-flight
/// fetch per identifier and that the scratch directory only ever has one
/// writer.
pub struct RemoteFileCache<B> {
    name: String,
    backend: B,
    /// Identifier to canonical artifact path
    entries: Mutex<HashMap<String, PathBuf>>,
    scratch: ScratchDir,
    entry_count: AtomicUsize,
    hits: AtomicU64,
    fetches: AtomicU64,
    not_modified: AtomicU64,
    failures: AtomicU64,
}

impl<B: FetchBackend> RemoteFileCache<B> {
    /// Create a cache whose scratch directory lives in the system temp location
    pub fn new(name: &str, backend: B) -> Result<Self> {
        let scratch = ScratchDir::new(name)?;
        Ok(Self::with_scratch(name, backend, scratch))
    }

    /// Create a cache whose scratch directory lives inside `parent`
    pub fn new_in(parent: &Path, name: &str, backend: B) -> Result<Self> {
        let scratch = ScratchDir::new_in(parent, name)?;
        Ok(Self::with_scratch(name, backend, scratch))
    }

    fn with_scratch(name: &str, backend: B, scratch: ScratchDir) -> Self {
        info!(cache = name, scratch_dir = ?scratch.path(), "Cache initialized");
        Self {
            name: name.to_string(),
            backend,
            entries: Mutex::new(HashMap::new()),
            scratch,
            entry_count: AtomicUsize::new(0),
            hits: AtomicU64::new(0),
            fetches: AtomicU64::new(0),
            not_modified: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn scratch_dir(&self) -> &Path {
        self.scratch.path()
    }

    /// Get the local path for `identifier`, fetching it if needed.
    ///
    /// Failures are reported with their original cause; use
    /// [`get_with_stats`](Self::get_with_stats) to observe fetch statistics.
    pub async fn get(&self, identifier: &str, options: GetOptions) -> Result<PathBuf> {
        self.get_with_stats(identifier, options)
            .await
            .map(|(path, _)| path)
            .map_err(CacheFetchError::into_cause)
    }

    /// Get the local path for `identifier` together with statistics about
    /// how it was obtained
    pub async fn get_with_stats(
        &self,
        identifier: &str,
        options: GetOptions,
    ) -> std::result::Result<(PathBuf, FetchStats), CacheFetchError> {
        let started_at = Instant::now();
        let mut entries = self.entries.lock().await;

        let mut existing = None;
        if let Some(cached) = entries.get(identifier).cloned() {
            match file_age_and_size(&cached).await {
                Some((age, size)) if options.is_fresh(age) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    debug!(cache = %self.name, identifier, ?age, "Cache hit");
                    let stats = FetchStats {
                        fetch_duration: started_at.elapsed(),
                        success: true,
                        cache_hit: true,
                        num_bytes_cached: size,
                        ..FetchStats::default()
                    };
                    return Ok((cached, stats));
                }
                Some((age, _)) => {
                    debug!(cache = %self.name, identifier, ?age, "Cache entry stale");
                    existing = Some(cached);
                }
                None => {
                    debug!(cache = %self.name, identifier, path = ?cached, "Cached file is gone, treating as miss");
                    entries.remove(identifier);
                    self.entry_count.fetch_sub(1, Ordering::Relaxed);
                }
            }
        }

        // Let other tasks run before a potentially long network operation
        tokio::task::yield_now().await;

        self.fetches.fetch_add(1, Ordering::Relaxed);
        let request = FetchRequest {
            identifier,
            existing: existing.as_deref(),
            started_at,
            scratch: &self.scratch,
            progress: options.progress.as_deref(),
        };

        let fetched = match self.backend.fetch(request).await {
            Ok(path) => path,
            Err(err) => {
                warn!(cache = %self.name, identifier, error = %err, "Fetch failed");
                let stats = FetchStats {
                    fetch_duration: started_at.elapsed(),
                    not_modified: err.is_not_modified(),
                    ..FetchStats::default()
                };
                return Err(self.failed(stats, err));
            }
        };

        assert!(
            self.scratch.contains(&fetched),
            "fetch backend of cache '{}' returned {:?}, which is outside the scratch directory {:?}",
            self.name,
            fetched,
            self.scratch.path()
        );

        if existing.as_deref() == Some(fetched.as_path()) {
            return self.revalidated(identifier, fetched, started_at).await;
        }

        let num_bytes_fetched = match fs::metadata(&fetched).await {
            Ok(metadata) => metadata.len(),
            Err(err) => {
                remove_quietly(&fetched).await;
                let stats = FetchStats {
                    fetch_duration: started_at.elapsed(),
                    ..FetchStats::default()
                };
                return Err(self.failed(stats, err));
            }
        };

        let canonical = match &options.transform {
            None => fetched,
            Some(transform) => {
                match self.transform_into_scratch(transform, &fetched).await {
                    Ok(transformed) => {
                        remove_quietly(&fetched).await;
                        transformed
                    }
                    Err(err) => {
                        warn!(cache = %self.name, identifier, error = %err, "Transform failed");
                        remove_quietly(&fetched).await;
                        let stats = FetchStats {
                            fetch_duration: started_at.elapsed(),
                            num_bytes_fetched,
                            ..FetchStats::default()
                        };
                        return Err(self.failed(stats, err));
                    }
                }
            }
        };

        let num_bytes_cached = match stamp_now(&canonical).await {
            Ok(size) => size,
            Err(err) => {
                remove_quietly(&canonical).await;
                let stats = FetchStats {
                    fetch_duration: started_at.elapsed(),
                    num_bytes_fetched,
                    ..FetchStats::default()
                };
                return Err(self.failed(stats, err));
            }
        };

        match entries.insert(identifier.to_string(), canonical.clone()) {
            Some(previous) if previous != canonical => {
                debug!(cache = %self.name, identifier, path = ?previous, "Removing superseded file");
                remove_quietly(&previous).await;
            }
            Some(_) => {}
            None => {
                self.entry_count.fetch_add(1, Ordering::Relaxed);
            }
        }

        debug!(
            cache = %self.name,
            identifier,
            num_bytes_fetched,
            num_bytes_cached,
            path = ?canonical,
            "Fetched file"
        );

        let stats = FetchStats {
            fetch_duration: started_at.elapsed(),
            success: true,
            cache_hit: false,
            not_modified: false,
            num_bytes_fetched,
            num_bytes_cached,
        };
        Ok((canonical, stats))
    }

    /// The backend confirmed the cached file is still current
    async fn revalidated(
        &self,
        identifier: &str,
        path: PathBuf,
        started_at: Instant,
    ) -> std::result::Result<(PathBuf, FetchStats), CacheFetchError> {
        match stamp_now(&path).await {
            Ok(size) => {
                self.not_modified.fetch_add(1, Ordering::Relaxed);
                debug!(cache = %self.name, identifier, "Not modified, refreshed timestamp");
                let stats = FetchStats {
                    fetch_duration: started_at.elapsed(),
                    success: true,
                    not_modified: true,
                    num_bytes_cached: size,
                    ..FetchStats::default()
                };
                Ok((path, stats))
            }
            Err(err) => {
                let stats = FetchStats {
                    fetch_duration: started_at.elapsed(),
                    not_modified: true,
                    ..FetchStats::default()
                };
                Err(self.failed(stats, err))
            }
        }
    }

    /// Stream `input` through `transform` into a new scratch file
    async fn transform_into_scratch(
        &self,
        transform: &Transform,
        input: &Path,
    ) -> std::result::Result<PathBuf, CacheError> {
        let output = self.scratch.new_writable_path()?;
        let transform = transform.clone();
        let source = input.to_path_buf();
        let target = output.clone();

        let result = tokio::task::spawn_blocking(move || -> io::Result<()> {
            let reader = io::BufReader::new(std::fs::File::open(&source)?);
            let mut transformed = transform(Box::new(reader))?;
            let mut writer = io::BufWriter::new(std::fs::File::create(&target)?);
            io::copy(&mut transformed, &mut writer)?;
            writer.flush()
        })
        .await
        .map_err(io::Error::other)
        .and_then(|result| result);

        match result {
            Ok(()) => Ok(output),
            Err(err) => {
                remove_quietly(&output).await;
                Err(CacheError::Transform(Box::new(err)))
            }
        }
    }

    fn failed(&self, stats: FetchStats, cause: impl Into<CacheError>) -> CacheFetchError {
        self.failures.fetch_add(1, Ordering::Relaxed);
        CacheFetchError::new(stats, cause)
    }

    /// Current cumulative statistics. Does not wait for an in-flight fetch.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entry_count.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            fetches: self.fetches.load(Ordering::Relaxed),
            not_modified: self.not_modified.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }

    /// Delete the scratch directory and every cached file
    pub fn dispose(self) -> Result<()> {
        info!(cache = %self.name, "Disposing cache");
        self.scratch.close()?;
        Ok(())
    }
}

/// Age and size of a file, or `None` if it no longer exists
async fn file_age_and_size(path: &Path) -> Option<(Duration, u64)> {
    let metadata = fs::metadata(path).await.ok()?;
    let age = match metadata.modified() {
        Ok(modified) => SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO),
        Err(_) => Duration::MAX,
    };
    Some((age, metadata.len()))
}

/// Set the modification time of `path` to now and return its size
async fn stamp_now(path: &Path) -> io::Result<u64> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || -> io::Result<u64> {
        set_modified(&path, SystemTime::now())?;
        Ok(std::fs::metadata(&path)?.len())
    })
    .await
    .map_err(io::Error::other)?
}

pub(crate) fn set_modified(path: &Path, time: SystemTime) -> io::Result<()> {
    let file = std::fs::OpenOptions::new().write(true).open(path)?;
    file.set_modified(time)
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        if e.kind() != io::ErrorKind::NotFound {
            warn!(path = ?path, error = %e, "Failed to remove cached file");
        }
    }
}
