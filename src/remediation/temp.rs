//! Best-effort sweep of a temporary directory.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use super::Outcome;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TempSweepReport {
    pub removed_count: usize,
    pub failed_count: usize,
    pub path: PathBuf,
}

impl TempSweepReport {
    pub fn outcome(&self) -> Outcome {
        match (self.removed_count, self.failed_count) {
            (_, 0) => Outcome::Success,
            (0, _) => Outcome::Failed,
            _ => Outcome::PartialFailure,
        }
    }
}

/// Delete every entry directly under `dir`, counting successes and failures.
/// A failure on one entry never stops the sweep. An unreadable directory
/// counts as one failure.
pub async fn clear_temporary_storage(dir: &Path) -> TempSweepReport {
    let dir = dir.to_path_buf();
    let path = dir.clone();
    match tokio::task::spawn_blocking(move || sweep(&dir)).await {
        Ok(report) => report,
        Err(e) => {
            warn!(error = %e, "temp sweep task failed");
            TempSweepReport {
                removed_count: 0,
                failed_count: 1,
                path,
            }
        }
    }
}

fn sweep(dir: &Path) -> TempSweepReport {
    let mut report = TempSweepReport {
        removed_count: 0,
        failed_count: 0,
        path: dir.to_path_buf(),
    };

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "cannot read temp directory");
            report.failed_count = 1;
            return report;
        }
    };

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(_) => {
                report.failed_count += 1;
                continue;
            }
        };
        let path = entry.path();
        // file_type() does not follow symlinks, so a link to a directory is
        // unlinked rather than recursed into.
        let result = match entry.file_type() {
            Ok(ft) if ft.is_dir() => std::fs::remove_dir_all(&path),
            Ok(_) => std::fs::remove_file(&path),
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => report.removed_count += 1,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "could not remove temp entry");
                report.failed_count += 1;
            }
        }
    }

    info!(
        dir = %dir.display(),
        removed = report.removed_count,
        failed = report.failed_count,
        "temp directory swept"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_directory_twice() {
        let dir = tempfile::tempdir().unwrap();
        for _ in 0..2 {
            let r = clear_temporary_storage(dir.path()).await;
            assert_eq!(r.removed_count, 0);
            assert_eq!(r.failed_count, 0);
            assert_eq!(r.outcome(), Outcome::Success);
        }
    }

    #[tokio::test]
    async fn removes_files_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.tmp"), b"x").unwrap();
        std::fs::create_dir_all(dir.path().join("sub/nested")).unwrap();
        std::fs::write(dir.path().join("sub/nested/b.tmp"), b"y").unwrap();

        let r = clear_temporary_storage(dir.path()).await;
        assert_eq!(r.removed_count, 2);
        assert_eq!(r.failed_count, 0);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

        let again = clear_temporary_storage(dir.path()).await;
        assert_eq!((again.removed_count, again.failed_count), (0, 0));
    }

    #[tokio::test]
    async fn missing_directory_is_a_failure_not_a_panic() {
        let dir = tempfile::tempdir().unwrap();
        let gone = dir.path().join("nope");
        let r = clear_temporary_storage(&gone).await;
        assert_eq!(r.removed_count, 0);
        assert_eq!(r.failed_count, 1);
        assert_eq!(r.outcome(), Outcome::Failed);
    }

    #[test]
    fn outcome_mapping() {
        let r = |removed, failed| TempSweepReport {
            removed_count: removed,
            failed_count: failed,
            path: PathBuf::new(),
        };
        assert_eq!(r(0, 0).outcome(), Outcome::Success);
        assert_eq!(r(5, 0).outcome(), Outcome::Success);
        assert_eq!(r(5, 2).outcome(), Outcome::PartialFailure);
        assert_eq!(r(0, 2).outcome(), Outcome::Failed);
    }
}
