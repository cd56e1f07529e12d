//! Worker process side of the pool protocol
//!
//! One JSON [`Job`] per line on stdin, one JSON [`Reply`] per line on stdout.
//! Stdout carries nothing else; logs go to stderr.

use std::io::{self, BufRead, Write};

use super::{job, Job, JobFailure, Reply};

/// Serve jobs until the input closes
pub fn serve<R: BufRead, W: Write>(input: R, mut output: W) -> io::Result<()> {
    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let reply: Reply = match serde_json::from_str::<Job>(&line) {
            Ok(job) => job::run(&job),
            Err(e) => {
                tracing::error!("Malformed job line: {}", e);
                Err(JobFailure::engine(format!("malformed job: {}", e)))
            }
        };

        serde_json::to_writer(&mut output, &reply)?;
        output.write_all(b"\n")?;
        output.flush()?;
    }

    tracing::debug!("Job input closed, worker exiting");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{FailureKind, JobOutcome};
    use std::io::Cursor;
    use tempfile::TempDir;

    #[test]
    fn test_one_reply_per_job_line() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("notes.txt");
        std::fs::write(&path, b"nothing to hide").unwrap();

        let extract = serde_json::to_string(&Job::Extract {
            path: path.clone(),
            sandbox: true,
        })
        .unwrap();
        let input = format!("{}\n\nnot json\n{}\n", extract, extract);

        let mut output = Vec::new();
        serve(Cursor::new(input), &mut output).unwrap();

        let replies: Vec<Reply> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        assert_eq!(replies.len(), 3);
        assert!(matches!(&replies[0], Ok(JobOutcome::Metadata { metadata }) if metadata.is_empty()));
        assert!(matches!(&replies[1], Err(f) if f.kind == FailureKind::Engine));
        assert_eq!(replies[0], replies[2]);
    }
}
