//! Private scratch directory owned by a cache instance

use std::io;
use std::path::{Component, Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

/// A temporary directory holding every artifact of one cache instance.
///
/// Removed recursively on [`ScratchDir::close`] or when dropped.
#[derive(Debug)]
pub struct ScratchDir {
    dir: TempDir,
}

impl ScratchDir {
    /// Create a scratch directory under the system temp location
    pub fn new(name: &str) -> io::Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(&format!("{}-", sanitize(name)))
            .tempdir()?;
        debug!(path = ?dir.path(), "Created scratch directory");
        Ok(Self { dir })
    }

    /// Create a scratch directory inside `parent`
    pub fn new_in(parent: &Path, name: &str) -> io::Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(&format!("{}-", sanitize(name)))
            .tempdir_in(parent)?;
        debug!(path = ?dir.path(), "Created scratch directory");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Allocate a new, empty file inside the directory and return its path.
    ///
    /// This is the only way artifacts may come into existence.
    pub fn new_writable_path(&self) -> io::Result<PathBuf> {
        let file = tempfile::Builder::new()
            .prefix("artifact-")
            .tempfile_in(self.dir.path())?;
        let path = file.into_temp_path().keep().map_err(|e| e.error)?;
        Ok(path)
    }

    /// Whether `path` lives inside this directory.
    ///
    /// Paths with `..` components are never inside, wherever they resolve.
    pub fn contains(&self, path: &Path) -> bool {
        path.starts_with(self.dir.path())
            && !path.components().any(|c| c == Component::ParentDir)
    }

    /// Delete the directory and everything in it
    pub fn close(self) -> io::Result<()> {
        let path = self.dir.path().to_path_buf();
        self.dir.close()?;
        debug!(path = ?path, "Removed scratch directory");
        Ok(())
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect()
}
