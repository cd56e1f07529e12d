//! Dependency status for the health probe

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DependencyStatus {
    pub found: bool,
    pub required: bool,
}

/// Dependency name to status; rebuilt on every check
pub type DependencyReport = BTreeMap<String, DependencyStatus>;

/// Format backends compiled into the engine
const BACKENDS: &[&str] = &["jpeg", "pdf", "png", "text", "zip"];

/// Check what the engine needs to serve requests.
///
/// `worker_program` is the executable the process pool re-runs; it is only
/// reported when the pool is in use. `work_dir` must be a writable directory.
pub fn check_dependencies(worker_program: Option<&Path>, work_dir: &Path) -> DependencyReport {
    let mut report = DependencyReport::new();

    for backend in BACKENDS {
        report.insert(
            backend.to_string(),
            DependencyStatus {
                found: true,
                required: true,
            },
        );
    }

    if let Some(program) = worker_program {
        report.insert(
            "worker".to_string(),
            DependencyStatus {
                found: program.is_file(),
                required: true,
            },
        );
    }

    let writable = std::fs::metadata(work_dir)
        .map(|meta| meta.is_dir() && !meta.permissions().readonly())
        .unwrap_or(false);
    report.insert(
        "work-dir".to_string(),
        DependencyStatus {
            found: writable,
            required: true,
        },
    );

    report
}
