//! Scope guard for a request's artifact

use std::path::{Path, PathBuf};

use super::scoped_cleanup;
use crate::sanitize::printable;

/// Owns an artifact path for the lifetime of one request.
///
/// Call [`ArtifactGuard::cleanup`] on every exit path. If the request future
/// is dropped first (client disconnect), `Drop` removes the file
/// synchronously instead.
#[derive(Debug)]
pub struct ArtifactGuard {
    path: PathBuf,
    armed: bool,
}

impl ArtifactGuard {
    pub fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the artifact if it still exists. Safe to call after
    /// `capture_and_delete` already consumed it.
    pub async fn cleanup(mut self) {
        self.armed = false;
        if scoped_cleanup(&self.path).await {
            tracing::debug!(artifact = %self.display(), "Artifact removed");
        }
    }

    fn display(&self) -> String {
        printable(&self.path.display().to_string())
    }
}

impl Drop for ArtifactGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(artifact = %self.display(), "Artifact removed on drop"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::error!(
                artifact = %self.display(),
                "Failed to remove artifact on drop: {}",
                e
            ),
        }
    }
}
