//! Multipart upload intake shared by `/show/` and `/clean/`

use axum::extract::Multipart;

use crate::artifact::{ArtifactGuard, ArtifactStore, PersistError, UploadedArtifact};
use crate::error::{AppError, Result};
use crate::sanitize::{printable, FALLBACK_FILENAME};

/// Stream the `file` field of a multipart body into a fresh artifact.
///
/// The returned guard owns the artifact for the rest of the request.
pub(crate) async fn receive(
    store: &ArtifactStore,
    multipart: &mut Multipart,
) -> Result<(UploadedArtifact, ArtifactGuard)> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field
            .file_name()
            .unwrap_or(FALLBACK_FILENAME)
            .to_string();
        tracing::debug!(filename = %printable(&filename), "Receiving upload");

        let (artifact, guard) = store.persist(&filename, field).await.map_err(|e| match e {
            PersistError::Read(e) => AppError::Upload(e),
            PersistError::Io(e) => AppError::Resource(format!("Failed to store upload: {}", e)),
        })?;

        tracing::debug!(
            artifact = %printable(&artifact.id),
            size = artifact.size,
            "Upload stored"
        );
        return Ok((artifact, guard));
    }

    tracing::warn!("No file field found in multipart upload");
    Err(AppError::BadRequest(
        "No file provided. Use field name 'file'".to_string(),
    ))
}
