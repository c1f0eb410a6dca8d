//! Conditional HTTP fetching for the remote file cache
//!
//! Provides a [`FetchBackend`](remote_file_cache::FetchBackend) that revalidates
//! with `If-None-Match` / `If-Modified-Since`, and a small purpose-named
//! facade binding it to a cache instance.

mod backend;
mod config;
pub mod error;
#[cfg(test)]
mod test_support;
mod url_cache;

pub use backend::ConditionalHttpFetchBackend;
pub use config::HttpBackendConfig;
pub use error::{HttpCacheError, Result};
pub use url_cache::UrlFileCache;
