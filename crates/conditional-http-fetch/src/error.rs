//! Error types for building HTTP-backed caches

use std::fmt;

#[derive(Debug)]
pub enum HttpCacheError {
    Client(Box<reqwest::Error>),
    Cache(remote_file_cache::CacheError),
}

impl fmt::Display for HttpCacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpCacheError::Client(err) => write!(f, "HTTP client error: {}", err),
            HttpCacheError::Cache(err) => write!(f, "Cache error: {}", err),
        }
    }
}

impl std::error::Error for HttpCacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HttpCacheError::Client(err) => Some(err.as_ref()),
            HttpCacheError::Cache(err) => Some(err),
        }
    }
}

impl From<reqwest::Error> for HttpCacheError {
    fn from(err: reqwest::Error) -> Self {
        HttpCacheError::Client(Box::new(err))
    }
}

impl From<remote_file_cache::CacheError> for HttpCacheError {
    fn from(err: remote_file_cache::CacheError) -> Self {
        HttpCacheError::Cache(err)
    }
}

pub type Result<T> = std::result::Result<T, HttpCacheError>;
