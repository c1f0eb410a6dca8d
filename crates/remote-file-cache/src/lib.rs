//! Read-through on-disk cache for remotely fetched files
//!
//! Files live in a private scratch directory owned by each cache instance.
//! Fetches are single-flight, freshness is judged from file modification
//! times, and an optional transform can post-process each new download.

mod backend;
mod cache;
pub mod error;
mod scratch;
mod types;

pub use backend::{FetchBackend, FetchRequest};
pub use cache::RemoteFileCache;
pub use error::{CacheError, CacheFetchError, FetchError, Result};
pub use scratch::ScratchDir;
pub use types::{transform, CacheStats, FetchStats, GetOptions, ProgressSink, Transform};
