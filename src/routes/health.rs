//! Health check endpoint

use std::path::Path;

use axum::extract::State;

use crate::engine::check_dependencies;
use crate::state::AppState;

/// Log dependency status and report liveness.
///
/// Always `OK`: a missing dependency shows up in the log, never as a failed
/// probe.
pub async fn healthz(State(state): State<AppState>) -> &'static str {
    let program = state.dispatcher().worker_program().map(Path::to_path_buf);
    let work_dir = state.store().root().to_path_buf();

    // The report stats files on disk
    let report = match tokio::task::spawn_blocking(move || {
        check_dependencies(program.as_deref(), &work_dir)
    })
    .await
    {
        Ok(report) => report,
        Err(e) => {
            tracing::error!("Dependency check failed: {}", e);
            return "OK";
        }
    };

    tracing::info!("Dependencies:");
    for (name, status) in &report {
        let found = if status.found { "yes" } else { "no" };
        if status.required {
            tracing::info!("- {}: {}", name, found);
        } else {
            tracing::info!("- {}: {} (optional)", name, found);
        }
    }

    "OK"
}
