//! Metadata removal endpoint

use std::path::Path;

use axum::{
    body::Body,
    extract::{rejection::QueryRejection, Multipart, Query, State},
    http::{header, StatusCode},
    response::Response,
};
use serde::Deserialize;

use super::{default_sandbox, upload};
use crate::artifact::{capture_and_delete, UploadedArtifact};
use crate::engine::{CleaningConfig, UnknownMemberPolicy};
use crate::error::{AppError, Result};
use crate::sanitize::printable;
use crate::state::AppState;

/// Appended to the stem of the returned file
const DOWNLOAD_SUFFIX: &str = "_metaclean";

#[derive(Debug, Deserialize)]
pub struct CleanParams {
    #[serde(default)]
    pub lightweight: bool,
    #[serde(default)]
    pub unknown_members: UnknownMemberPolicy,
    #[serde(default = "default_sandbox")]
    pub sandbox: bool,
}

impl From<CleanParams> for CleaningConfig {
    fn from(params: CleanParams) -> Self {
        CleaningConfig {
            lightweight: params.lightweight,
            unknown_member_policy: params.unknown_members,
            sandbox: params.sandbox,
        }
    }
}

/// Strip metadata from an uploaded file and return the cleaned copy
pub async fn clean(
    State(state): State<AppState>,
    params: std::result::Result<Query<CleanParams>, QueryRejection>,
    mut multipart: Multipart,
) -> Result<Response> {
    let Query(params) = params.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let config = CleaningConfig::from(params);

    let (artifact, guard) = upload::receive(state.store(), &mut multipart).await?;

    let response = clean_artifact(&state, &artifact, config).await;
    guard.cleanup().await;
    response
}

async fn clean_artifact(
    state: &AppState,
    artifact: &UploadedArtifact,
    config: CleaningConfig,
) -> Result<Response> {
    let cleaned = state
        .dispatcher()
        .submit_clean(artifact.path.clone(), config)
        .await?;
    if !cleaned {
        return Err(AppError::Engine("Failed to remove metadata".to_string()));
    }

    // The cleaned file replaced the artifact; take its bytes and drop it
    let data = capture_and_delete(&artifact.path)
        .await
        .map_err(|e| AppError::Resource(format!("{}: {}", artifact.path.display(), e)))?;

    let download = download_name(&artifact.original_name);
    tracing::info!(
        filename = %printable(&download),
        size = data.len(),
        lightweight = config.lightweight,
        "Cleaned file ready"
    );

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_LENGTH, data.len())
        .header(header::CONTENT_DISPOSITION, content_disposition(&download))
        .body(Body::from(data))
        .map_err(|e| AppError::Internal(e.to_string()))
}

/// `report.pdf` -> `report_metaclean.pdf`
fn download_name(original: &str) -> String {
    let path = Path::new(original);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    match path.extension() {
        Some(ext) => format!("{}{}.{}", stem, DOWNLOAD_SUFFIX, ext.to_string_lossy()),
        None => format!("{}{}", stem, DOWNLOAD_SUFFIX),
    }
}

/// Attachment header with an ASCII fallback and an RFC 5987 UTF-8 name
fn content_disposition(filename: &str) -> String {
    let fallback: String = filename
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if fallback == filename {
        format!("attachment; filename=\"{}\"", filename)
    } else {
        format!(
            "attachment; filename=\"{}\"; filename*=UTF-8''{}",
            fallback,
            urlencoding::encode(filename)
        )
    }
}
