//! Metadata inspection endpoint

use axum::{
    extract::{rejection::QueryRejection, Multipart, Query, State},
    Json,
};
use serde::Deserialize;

use super::{default_sandbox, upload};
use crate::engine::Metadata;
use crate::error::{AppError, Result};
use crate::sanitize::printable;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ShowParams {
    #[serde(default = "default_sandbox")]
    pub sandbox: bool,
}

/// Report the metadata embedded in an uploaded file
pub async fn show(
    State(state): State<AppState>,
    params: std::result::Result<Query<ShowParams>, QueryRejection>,
    mut multipart: Multipart,
) -> Result<Json<Metadata>> {
    let Query(params) = params.map_err(|e| AppError::BadRequest(e.body_text()))?;

    let (artifact, guard) = upload::receive(state.store(), &mut multipart).await?;

    let result = state
        .dispatcher()
        .submit_extract(artifact.path.clone(), params.sandbox)
        .await;
    guard.cleanup().await;

    let metadata = result?;
    tracing::info!(
        filename = %printable(&artifact.original_name),
        fields = metadata.len(),
        "Metadata extracted"
    );
    Ok(Json(metadata))
}
