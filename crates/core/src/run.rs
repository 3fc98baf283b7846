use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Per-run filesystem scope: a uuid-scoped download directory and a dated
/// log artifact. Both are transient; `cleanup` removes them on a clean exit
/// so nothing survives a successful run. On failure they are left in place
/// for diagnosis.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: Uuid,
    pub download_dir: PathBuf,
    pub log_path: PathBuf,
}

impl RunContext {
    pub fn create(base: &Path) -> Result<Self> {
        let run_id = Uuid::new_v4();

        let download_dir = base.join("csv").join(run_id.to_string());
        std::fs::create_dir_all(&download_dir).with_context(|| {
            format!("failed to create download dir {}", download_dir.display())
        })?;

        let log_dir = base.join("log");
        std::fs::create_dir_all(&log_dir)
            .with_context(|| format!("failed to create log dir {}", log_dir.display()))?;
        let log_path = log_dir.join(format!(
            "{}_result.log",
            chrono::Utc::now().format("%Y-%m-%d")
        ));

        Ok(Self {
            run_id,
            download_dir,
            log_path,
        })
    }

    pub fn open_log_file(&self) -> Result<std::fs::File> {
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .with_context(|| format!("failed to open run log {}", self.log_path.display()))
    }

    pub fn cleanup(&self) -> Result<()> {
        if self.download_dir.exists() {
            std::fs::remove_dir_all(&self.download_dir).with_context(|| {
                format!("failed to remove download dir {}", self.download_dir.display())
            })?;
        }
        if self.log_path.exists() {
            std::fs::remove_file(&self.log_path).with_context(|| {
                format!("failed to remove run log {}", self.log_path.display())
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_scoped_dirs_and_cleans_them_up() {
        let base = tempfile::tempdir().unwrap();
        let ctx = RunContext::create(base.path()).unwrap();
        assert!(ctx.download_dir.is_dir());

        let _ = ctx.open_log_file().unwrap();
        std::fs::write(ctx.download_dir.join("export.csv"), b"data").unwrap();

        ctx.cleanup().unwrap();
        assert!(!ctx.download_dir.exists());
        assert!(!ctx.log_path.exists());
    }

    #[test]
    fn cleanup_tolerates_already_missing_artifacts() {
        let base = tempfile::tempdir().unwrap();
        let ctx = RunContext::create(base.path()).unwrap();
        ctx.cleanup().unwrap();
        ctx.cleanup().unwrap();
    }

    #[test]
    fn download_dirs_are_scoped_per_run() {
        let base = tempfile::tempdir().unwrap();
        let a = RunContext::create(base.path()).unwrap();
        let b = RunContext::create(base.path()).unwrap();
        assert_ne!(a.download_dir, b.download_dir);
    }
}
