use crate::error::CheckError;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

// In-flight browser downloads carry one of these suffixes until complete.
const PARTIAL_SUFFIXES: [&str; 3] = [".crdownload", ".part", ".tmp"];

/// Returns the most recently created complete file in the per-run download
/// directory. An empty directory after the export step means the download
/// never landed, which is fatal.
pub fn latest_created_file(dir: &Path) -> Result<PathBuf> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read download dir {}", dir.display()))?;

    let mut newest: Option<(SystemTime, PathBuf)> = None;
    for entry in entries {
        let entry = entry.context("failed to read download dir entry")?;
        let path = entry.path();
        if !path.is_file() || is_partial(&path) {
            continue;
        }

        let meta = entry
            .metadata()
            .with_context(|| format!("failed to stat {}", path.display()))?;
        // Creation time where the filesystem reports it, modification time
        // otherwise.
        let stamp = meta.created().or_else(|_| meta.modified()).with_context(|| {
            format!("filesystem reports no timestamps for {}", path.display())
        })?;

        match &newest {
            Some((best, _)) if *best >= stamp => {}
            _ => newest = Some((stamp, path)),
        }
    }

    match newest {
        Some((_, path)) => Ok(path),
        None => Err(CheckError::NoFileFound(dir.display().to_string()).into()),
    }
}

/// Polls until a complete file lands in `dir`, failing after `timeout`.
/// Used after triggering the CSV export; the browser writes asynchronously.
pub async fn wait_for_download(dir: &Path, timeout: Duration, poll: Duration) -> Result<PathBuf> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Ok(path) = latest_created_file(dir) {
            return Ok(path);
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(CheckError::NoFileFound(dir.display().to_string()).into());
        }
        tokio::time::sleep(poll).await;
    }
}

fn is_partial(path: &Path) -> bool {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    name.starts_with('.') || PARTIAL_SUFFIXES.iter().any(|s| name.ends_with(s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_directory_is_a_no_file_found_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = latest_created_file(dir.path()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CheckError>(),
            Some(CheckError::NoFileFound(_))
        ));
    }

    #[test]
    fn picks_the_most_recently_created_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("first.csv"), b"a").unwrap();
        std::thread::sleep(Duration::from_millis(20));
        std::fs::write(dir.path().join("second.csv"), b"b").unwrap();

        let latest = latest_created_file(dir.path()).unwrap();
        assert_eq!(latest.file_name().unwrap(), "second.csv");
    }

    #[test]
    fn partial_downloads_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("report.csv"), b"a").unwrap();
        std::thread::sleep(Duration::from_millis(20));
        std::fs::write(dir.path().join("newer.csv.crdownload"), b"b").unwrap();

        let latest = latest_created_file(dir.path()).unwrap();
        assert_eq!(latest.file_name().unwrap(), "report.csv");
    }

    #[tokio::test]
    async fn wait_for_download_times_out_on_an_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        let res = wait_for_download(
            dir.path(),
            Duration::from_millis(50),
            Duration::from_millis(10),
        )
        .await;
        assert!(res.is_err());
    }
}
