//! Error types for the remote file cache

use crate::types::FetchStats;
use std::fmt;

/// Failure reported by a [`FetchBackend`](crate::FetchBackend)
#[derive(Debug)]
pub enum FetchError {
    /// The identifier could not be interpreted by the backend
    InvalidIdentifier(String),
    /// The remote answered with a non-success status
    Status(u16),
    /// The remote answered "not modified" but there is no cached artifact to reuse
    NotModifiedWithoutCache,
    Io(Box<std::io::Error>),
    Transport(Box<dyn std::error::Error + Send + Sync>),
}

impl FetchError {
    /// Wrap a transport-level error (connection, timeout, body read)
    pub fn transport<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        FetchError::Transport(Box::new(err))
    }

    /// Whether the remote signalled "not modified" for this failure
    pub fn is_not_modified(&self) -> bool {
        matches!(self, FetchError::NotModifiedWithoutCache)
    }

    /// Whether this failure stems from bad input rather than the network
    pub fn is_input_error(&self) -> bool {
        matches!(self, FetchError::InvalidIdentifier(_))
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::InvalidIdentifier(msg) => write!(f, "Invalid identifier: {}", msg),
            FetchError::Status(status) => write!(f, "Remote returned status {}", status),
            FetchError::NotModifiedWithoutCache => {
                write!(f, "Remote returned 304 Not Modified but no cached file exists")
            }
            FetchError::Io(err) => write!(f, "IO error: {}", err),
            FetchError::Transport(err) => write!(f, "Transport error: {}", err),
        }
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FetchError::Io(err) => Some(err.as_ref()),
            FetchError::Transport(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for FetchError {
    fn from(err: std::io::Error) -> Self {
        FetchError::Io(Box::new(err))
    }
}

/// Errors surfaced by [`RemoteFileCache`](crate::RemoteFileCache)
#[derive(Debug)]
pub enum CacheError {
    Fetch(FetchError),
    Transform(Box<std::io::Error>),
    Io(Box<std::io::Error>),
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::Fetch(err) => write!(f, "Fetch failed: {}", err),
            CacheError::Transform(err) => write!(f, "Transform failed: {}", err),
            CacheError::Io(err) => write!(f, "Cache IO error: {}", err),
        }
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CacheError::Fetch(err) => Some(err),
            CacheError::Transform(err) => Some(err.as_ref()),
            CacheError::Io(err) => Some(err.as_ref()),
        }
    }
}

impl From<FetchError> for CacheError {
    fn from(err: FetchError) -> Self {
        CacheError::Fetch(err)
    }
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::Io(Box::new(err))
    }
}

/// A failed `get` together with the statistics gathered up to the failure
#[derive(Debug)]
pub struct CacheFetchError {
    pub stats: FetchStats,
    pub cause: CacheError,
}

impl CacheFetchError {
    pub fn new(stats: FetchStats, cause: impl Into<CacheError>) -> Self {
        Self {
            stats,
            cause: cause.into(),
        }
    }

    /// Drop the statistics and keep the underlying cause
    pub fn into_cause(self) -> CacheError {
        self.cause
    }
}

impl fmt::Display for CacheFetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (after {:?}, {} bytes fetched)",
            self.cause, self.stats.fetch_duration, self.stats.num_bytes_fetched
        )
    }
}

impl std::error::Error for CacheFetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.cause)
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;
