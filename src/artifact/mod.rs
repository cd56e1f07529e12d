//! Upload Artifacts
//!
//! Every request writes its upload to a uniquely named file in the working
//! directory and must leave nothing behind. The flow is:
//!
//! 1. [`ArtifactStore::persist`] creates `<uuid>-<filename>` and hands its
//!    path to an [`ArtifactGuard`] before streaming the body into it
//! 2. The guard travels with the request until the response is built
//! 3. The engine reads (and for cleaning, rewrites) the file in a worker
//! 4. [`capture_and_delete`] pulls the cleaned bytes into memory
//! 5. [`ArtifactGuard::cleanup`] removes whatever is left
//!
//! Names never collide because of the UUID prefix, so concurrent requests
//! need no locking even when clients send the same filename.

mod guard;

use std::fmt::Display;
use std::io;
use std::path::{Path, PathBuf};

use axum::body::Bytes;
use futures::{Stream, StreamExt};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::sanitize::{printable, sanitize_filename};

pub use guard::ArtifactGuard;

/// Errors while persisting an upload
#[derive(Debug, thiserror::Error)]
pub enum PersistError<E> {
    /// The request body could not be read
    #[error("Failed to read upload: {0}")]
    Read(E),

    /// The artifact could not be written
    #[error("Failed to write artifact: {0}")]
    Io(#[from] io::Error),
}

/// A temporary file holding one request's upload
#[derive(Debug, Clone)]
pub struct UploadedArtifact {
    /// `<uuid>-<sanitized filename>`
    pub id: String,
    /// Absolute path in the working directory
    pub path: PathBuf,
    /// Sanitized client filename
    pub original_name: String,
    pub size: u64,
}

/// Permission required before handing a path to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Read,
    /// In-place rewrite
    ReadWrite,
}

/// Creates artifacts under a working directory
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// The root is made absolute so worker processes resolve the same paths
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = std::path::absolute(&root).unwrap_or(root);
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the working directory if needed
    pub async fn ensure_root(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.root).await
    }

    /// Fresh identifier and path for a client filename
    pub fn allocate(&self, filename: &str) -> (String, PathBuf) {
        let id = format!("{}-{}", Uuid::new_v4(), sanitize_filename(filename));
        let path = self.root.join(&id);
        (id, path)
    }

    /// Stream an upload to a fresh artifact.
    ///
    /// The file is flushed and synced before returning. It is owned by the
    /// returned [`ArtifactGuard`] from the moment it is created, so a failed
    /// or dropped upload leaves nothing on disk.
    pub async fn persist<S, E>(
        &self,
        filename: &str,
        body: S,
    ) -> Result<(UploadedArtifact, ArtifactGuard), PersistError<E>>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Display,
    {
        let mut body = std::pin::pin!(body);
        let (id, path) = self.allocate(filename);
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        let guard = ArtifactGuard::new(path.clone());

        let mut size = 0u64;
        let written: Result<(), PersistError<E>> = async {
            while let Some(chunk) = body.next().await {
                let chunk = chunk.map_err(PersistError::Read)?;
                file.write_all(&chunk).await?;
                size += chunk.len() as u64;
            }
            file.flush().await?;
            file.sync_all().await?;
            Ok(())
        }
        .await;
        drop(file);

        if let Err(e) = written {
            tracing::debug!(artifact = %printable(&id), "Upload failed: {}", e);
            guard.cleanup().await;
            return Err(e);
        }

        tracing::debug!(artifact = %printable(&id), size, "Upload persisted");

        let artifact = UploadedArtifact {
            original_name: sanitize_filename(filename),
            id,
            path,
            size,
        };
        Ok((artifact, guard))
    }
}

/// True iff `path` is a regular file (not a symlink) accessible in `mode`.
///
/// Each failure is logged with its reason so callers can turn a bare
/// `false` into a structured precondition error.
pub fn validate_accessible(path: &Path, mode: AccessMode) -> bool {
    let shown = printable(&path.display().to_string());

    let meta = match std::fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(_) => {
            tracing::warn!("[-] {} doesn't exist.", shown);
            return false;
        }
    };
    if meta.file_type().is_symlink() {
        tracing::warn!("[-] {} is a symbolic link.", shown);
        return false;
    }
    if !meta.is_file() {
        tracing::warn!("[-] {} is not a regular file.", shown);
        return false;
    }

    // Opening is the authoritative access check; nothing is truncated
    let opened = match mode {
        AccessMode::Read => std::fs::File::open(path).map(drop),
        AccessMode::ReadWrite => std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map(drop),
    };
    if opened.is_err() {
        let wanted = match mode {
            AccessMode::Read => "readable",
            AccessMode::ReadWrite => "readable nor writeable",
        };
        tracing::warn!("[-] {} is not {}.", shown, wanted);
        return false;
    }
    true
}

/// Read a file fully into memory, then delete it
pub async fn capture_and_delete(path: &Path) -> io::Result<Bytes> {
    let data = tokio::fs::read(path).await?;
    tokio::fs::remove_file(path).await?;
    Ok(Bytes::from(data))
}

/// Delete `path` if it still exists. Idempotent.
///
/// Returns whether a file was removed. Failures are logged, never raised:
/// a cleanup problem must not replace the error a client is about to see.
pub async fn scoped_cleanup(path: &Path) -> bool {
    match tokio::fs::remove_file(path).await {
        Ok(()) => true,
        Err(e) if e.kind() == io::ErrorKind::NotFound => false,
        Err(e) => {
            tracing::error!(
                path = %printable(&path.display().to_string()),
                "Failed to remove artifact: {}",
                e
            );
            false
        }
    }
}
