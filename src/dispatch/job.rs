//! The engine routine every worker runs
//!
//! Workers open the artifact fresh for each job. A clean job writes the
//! engine's output next to the artifact, copies the artifact's permission
//! bits onto it and renames it over the artifact, so on success the
//! original path holds the cleaned file.

use std::path::Path;

use super::{Job, JobFailure, JobOutcome, Reply};
use crate::artifact::{validate_accessible, AccessMode};
use crate::engine::{resolve_parser, CleaningConfig, Metadata, MetadataParser};
use crate::sanitize::printable;

/// Execute one job to completion
pub fn run(job: &Job) -> Reply {
    match job {
        Job::Extract { path, sandbox } => {
            extract(path, *sandbox).map(|metadata| JobOutcome::Metadata { metadata })
        }
        Job::Clean { path, config } => {
            clean(path, config).map(|cleaned| JobOutcome::Cleaned { cleaned })
        }
    }
}

fn extract(path: &Path, sandbox: bool) -> Result<Metadata, JobFailure> {
    ensure_accessible(path, AccessMode::Read)?;

    let mut parser = resolve(path, "processing")?;
    parser.configure(&CleaningConfig::inspect(sandbox));
    parser.get_meta().map_err(|e| {
        JobFailure::engine(format!("something went wrong during processing: {}", e))
    })
}

/// `Ok(false)` when the artifact can't be rewritten in place
fn clean(path: &Path, config: &CleaningConfig) -> Result<bool, JobFailure> {
    if !validate_accessible(path, AccessMode::ReadWrite) {
        return Ok(false);
    }

    let mut parser = resolve(path, "cleaning")?;
    parser.configure(config);
    let output = parser.output_path().to_path_buf();

    match parser.remove_all() {
        Ok(true) => {}
        Ok(false) => {
            discard(&output);
            return Ok(false);
        }
        Err(e) => {
            discard(&output);
            return Err(JobFailure::engine(format!("can't be cleaned: {}", e)));
        }
    }
    drop(parser);

    replace_original(path, &output)?;
    tracing::debug!(
        artifact = %printable(&path.display().to_string()),
        lightweight = config.lightweight,
        sandbox = config.sandbox,
        "Metadata removed"
    );
    Ok(true)
}

fn ensure_accessible(path: &Path, mode: AccessMode) -> Result<(), JobFailure> {
    if validate_accessible(path, mode) {
        Ok(())
    } else {
        Err(JobFailure::resource(format!(
            "{} is not accessible",
            path.display()
        )))
    }
}

fn resolve(path: &Path, stage: &str) -> Result<Box<dyn MetadataParser>, JobFailure> {
    match resolve_parser(path) {
        Ok((Some(parser), _)) => Ok(parser),
        Ok((None, label)) => {
            tracing::info!(format = %printable(&label), "Unsupported format");
            Err(JobFailure::unsupported(&label))
        }
        Err(e) => Err(JobFailure::engine(format!(
            "something went wrong during {}: {}",
            stage, e
        ))),
    }
}

/// Copy permission bits, then rename `output` over `original`.
///
/// Any failure here is a filesystem problem, never an engine one. The
/// output is removed so nothing but the artifact is left to clean up.
fn replace_original(original: &Path, output: &Path) -> Result<(), JobFailure> {
    let replaced = std::fs::metadata(original)
        .and_then(|meta| std::fs::set_permissions(output, meta.permissions()))
        .and_then(|()| std::fs::rename(output, original));

    replaced.map_err(|e| {
        discard(output);
        JobFailure::resource(format!(
            "failed to replace {} with cleaned output: {}",
            original.display(),
            e
        ))
    })
}

fn discard(output: &Path) {
    match std::fs::remove_file(output) {
        Ok(()) => tracing::debug!("Removed partial output"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::error!(
            path = %printable(&output.display().to_string()),
            "Failed to remove partial output: {}",
            e
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::FailureKind;
    use crate::engine::{output_path_for, MetaValue, UnknownMemberPolicy};
    use crate::test_support::{write_sample_pdf, write_zip};
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn clean_job(path: PathBuf, policy: UnknownMemberPolicy) -> Job {
        Job::Clean {
            path,
            config: CleaningConfig {
                unknown_member_policy: policy,
                ..CleaningConfig::default()
            },
        }
    }

    #[test]
    fn test_extract_then_clean_pdf_in_place() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("abc-report.pdf");
        write_sample_pdf(&path);

        let extract = Job::Extract {
            path: path.clone(),
            sandbox: true,
        };
        match run(&extract) {
            Ok(JobOutcome::Metadata { metadata }) => {
                assert_eq!(metadata.get("creator"), Some(&MetaValue::from("Writer 1.0")));
                assert_eq!(
                    metadata.get("creation-date"),
                    Some(&MetaValue::from("D:20240101000000Z"))
                );
            }
            other => panic!("unexpected reply: {:?}", other),
        }

        let reply = run(&clean_job(path.clone(), UnknownMemberPolicy::Abort));
        assert_eq!(reply, Ok(JobOutcome::Cleaned { cleaned: true }));
        assert!(path.exists());
        assert!(!output_path_for(&path).exists());

        match run(&extract) {
            Ok(JobOutcome::Metadata { metadata }) => {
                assert!(!metadata.contains_key("creator"));
                assert!(!metadata.contains_key("creation-date"));
            }
            other => panic!("unexpected reply: {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_clean_keeps_permission_bits() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("notes.txt");
        std::fs::write(&path, b"plain words").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o640)).unwrap();

        let reply = run(&clean_job(path.clone(), UnknownMemberPolicy::Abort));
        assert_eq!(reply, Ok(JobOutcome::Cleaned { cleaned: true }));

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o640);
    }

    #[test]
    fn test_unsupported_format() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("garbage.bin");
        std::fs::write(&path, [0x00, 0xFF, 0x13, 0x37]).unwrap();

        let err = run(&clean_job(path.clone(), UnknownMemberPolicy::Abort)).unwrap_err();
        assert_eq!(err.kind, FailureKind::UnsupportedFormat);
        assert!(err.message.contains("is not supported"));
        // Untouched: the request layer owns the artifact
        assert!(path.exists());
    }

    #[test]
    fn test_engine_failure_leaves_no_partial_output() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bundle.zip");
        write_zip(&path, &[("blob.bin", vec![9, 9, 9])]);

        let err = run(&clean_job(path.clone(), UnknownMemberPolicy::Abort)).unwrap_err();
        assert_eq!(err.kind, FailureKind::Engine);
        assert!(err.message.starts_with("can't be cleaned:"));
        assert!(err.message.contains("blob.bin"));
        assert!(!output_path_for(&path).exists());
    }

    #[test]
    fn test_clean_of_missing_artifact_reports_not_cleaned() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("gone.pdf");

        let reply = run(&clean_job(path.clone(), UnknownMemberPolicy::Abort));
        assert_eq!(reply, Ok(JobOutcome::Cleaned { cleaned: false }));
        assert!(!output_path_for(&path).exists());
    }

    #[test]
    fn test_failed_rename_is_resource_failure_and_drops_output() {
        let temp_dir = TempDir::new().unwrap();
        // A non-empty directory can't be replaced by a file
        let original = temp_dir.path().join("abc-report.pdf");
        std::fs::create_dir(&original).unwrap();
        std::fs::write(original.join("inner"), b"x").unwrap();
        let output = output_path_for(&original);
        std::fs::write(&output, b"cleaned").unwrap();

        let err = replace_original(&original, &output).unwrap_err();
        assert_eq!(err.kind, FailureKind::Resource);
        assert!(err.message.starts_with("failed to replace"));
        assert!(!output.exists());
        assert!(original.join("inner").exists());
    }

    #[test]
    fn test_missing_artifact_is_resource_failure() {
        let temp_dir = TempDir::new().unwrap();
        let err = run(&Job::Extract {
            path: temp_dir.path().join("gone.pdf"),
            sandbox: true,
        })
        .unwrap_err();
        assert_eq!(err.kind, FailureKind::Resource);
    }
}
