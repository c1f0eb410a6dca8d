//! # Fetch Backend
//!
//! The contract between the cache engine and whatever actually retrieves
//! remote content.

use crate::error::FetchError;
use crate::scratch::ScratchDir;
use crate::types::ProgressSink;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Everything a backend gets to perform one fetch
pub struct FetchRequest<'a> {
    pub identifier: &'a str,
    /// The artifact currently cached for `identifier`, if any
    pub existing: Option<&'a Path>,
    /// When the enclosing `get` call started
    pub started_at: Instant,
    pub scratch: &'a ScratchDir,
    pub progress: Option<&'a dyn ProgressSink>,
}

impl FetchRequest<'_> {
    /// Allocate the file a fresh download must be written to
    pub fn new_writable_path(&self) -> Result<PathBuf, FetchError> {
        Ok(self.scratch.new_writable_path()?)
    }

    pub fn report_progress(&self, bytes_so_far: u64, total: Option<u64>) {
        if let Some(progress) = self.progress {
            progress.on_progress(bytes_so_far, total);
        }
    }
}

/// Retrieves the content behind an identifier.
///
/// Implementations must return either `request.existing` unchanged (the
/// content is not modified) or a path obtained from
/// [`FetchRequest::new_writable_path`]. Any other path is a contract
/// violation and makes the cache panic.
#[async_trait]
pub trait FetchBackend: Send + Sync {
    async fn fetch(&self, request: FetchRequest<'_>) -> Result<PathBuf, FetchError>;
}
