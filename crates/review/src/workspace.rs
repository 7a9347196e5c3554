//! Ephemeral staging directories for current captures and diff images

use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

use shotdiff_common::Result;

/// Owns the current-capture and diff staging directories
#[derive(Debug, Clone)]
pub struct TempWorkspace {
    current_dir: PathBuf,
    diff_dir: PathBuf,
}

impl TempWorkspace {
    pub fn new(current_dir: impl Into<PathBuf>, diff_dir: impl Into<PathBuf>) -> Self {
        Self {
            current_dir: current_dir.into(),
            diff_dir: diff_dir.into(),
        }
    }

    /// Delete both directories if present and create them again, empty.
    pub async fn recreate(&self) -> Result<()> {
        tokio::try_join!(
            recreate_dir(&self.current_dir),
            recreate_dir(&self.diff_dir)
        )?;
        Ok(())
    }

    pub fn current_dir(&self) -> &Path {
        &self.current_dir
    }

    pub fn diff_dir(&self) -> &Path {
        &self.diff_dir
    }
}

async fn recreate_dir(dir: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => debug!("Removed stale directory {}", dir.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    tokio::fs::create_dir_all(dir).await?;
    debug!("Created {}", dir.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn is_empty(dir: &Path) -> bool {
        let mut entries = tokio::fs::read_dir(dir).await.unwrap();
        entries.next_entry().await.unwrap().is_none()
    }

    #[tokio::test]
    async fn test_recreate_creates_missing_dirs() {
        let tmp = TempDir::new().unwrap();
        let workspace = TempWorkspace::new(tmp.path().join("a/curr"), tmp.path().join("a/diff"));

        workspace.recreate().await.unwrap();

        assert!(workspace.current_dir().is_dir());
        assert!(workspace.diff_dir().is_dir());
    }

    #[tokio::test]
    async fn test_recreate_empties_existing_dirs() {
        let tmp = TempDir::new().unwrap();
        let curr = tmp.path().join("curr");
        let diff = tmp.path().join("diff");
        std::fs::create_dir_all(curr.join("nested")).unwrap();
        std::fs::write(curr.join("nested/old.png"), b"png").unwrap();
        std::fs::create_dir_all(&diff).unwrap();
        std::fs::write(diff.join("old-diff.png"), b"png").unwrap();

        let workspace = TempWorkspace::new(&curr, &diff);
        workspace.recreate().await.unwrap();

        assert!(is_empty(&curr).await);
        assert!(is_empty(&diff).await);
    }

    #[tokio::test]
    async fn test_recreate_is_repeatable() {
        let tmp = TempDir::new().unwrap();
        let workspace = TempWorkspace::new(tmp.path().join("curr"), tmp.path().join("diff"));
        workspace.recreate().await.unwrap();
        std::fs::write(workspace.current_dir().join("x.png"), b"x").unwrap();
        workspace.recreate().await.unwrap();
        assert!(is_empty(workspace.current_dir()).await);
    }

    #[tokio::test]
    async fn test_recreate_fails_when_path_is_a_file() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        let workspace = TempWorkspace::new(blocker.join("curr"), tmp.path().join("diff"));
        assert!(workspace.recreate().await.is_err());
    }
}
