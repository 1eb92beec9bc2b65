//! The `current` / `last` / `next` symlinks under the deployments directory.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{Result, UpgradeError};
use crate::io;
use crate::paths;

#[derive(Debug, Clone)]
pub struct DeploymentLayout {
    root: PathBuf,
}

impl DeploymentLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The deployment `current` points at, if any.
    pub fn current(&self) -> Result<Option<PathBuf>> {
        io::read_link_target(&paths::current_link(&self.root))
    }

    pub fn next(&self) -> Result<Option<PathBuf>> {
        io::read_link_target(&paths::next_link(&self.root))
    }

    pub fn is_current(&self, deployment: &Path) -> Result<bool> {
        match self.current()? {
            Some(current) => Ok(same_path(&current, deployment)),
            None => Ok(false),
        }
    }

    /// Make `deployment` current, moving the previous one to `last`.
    /// Returns `false` if it already was current.
    pub fn activate(&self, deployment: &Path) -> Result<bool> {
        if !deployment.is_dir() {
            return Err(UpgradeError::DeploymentNotFound(deployment.to_path_buf()));
        }
        let previous = self.current()?;
        if let Some(prev) = &previous {
            if same_path(prev, deployment) {
                info!("{} is already the current deployment", deployment.display());
                self.clear_next(deployment)?;
                return Ok(false);
            }
            io::atomic_symlink(&paths::last_link(&self.root), prev)?;
        }
        io::atomic_symlink(&paths::current_link(&self.root), deployment)?;
        self.clear_next(deployment)?;
        info!("activated deployment {}", deployment.display());
        Ok(true)
    }

    /// Point `next` at `deployment` without touching `current`.
    pub fn stage_next(&self, deployment: &Path) -> Result<()> {
        if !deployment.is_dir() {
            return Err(UpgradeError::DeploymentNotFound(deployment.to_path_buf()));
        }
        io::atomic_symlink(&paths::next_link(&self.root), deployment)?;
        info!("staged {} as the next deployment", deployment.display());
        Ok(())
    }

    fn clear_next(&self, deployment: &Path) -> Result<()> {
        if let Some(next) = self.next()? {
            if same_path(&next, deployment) {
                io::remove_link(&paths::next_link(&self.root))?;
            }
        }
        Ok(())
    }
}

fn same_path(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, DeploymentLayout, PathBuf, PathBuf) {
        let dir = TempDir::new().unwrap();
        let old = dir.path().join("2024-01-01-00-00-00");
        let new = dir.path().join("2024-06-01-00-00-00");
        std::fs::create_dir(&old).unwrap();
        std::fs::create_dir(&new).unwrap();
        std::os::unix::fs::symlink(&old, dir.path().join("current")).unwrap();
        let layout = DeploymentLayout::new(dir.path());
        (dir, layout, old, new)
    }

    #[test]
    fn activate_moves_current_to_last() {
        let (dir, layout, old, new) = setup();
        assert!(layout.activate(&new).unwrap());
        assert!(layout.is_current(&new).unwrap());
        assert_eq!(
            io::read_link_target(&dir.path().join("last")).unwrap(),
            Some(old)
        );
    }

    #[test]
    fn activate_is_idempotent() {
        let (dir, layout, old, new) = setup();
        assert!(layout.activate(&new).unwrap());
        assert!(!layout.activate(&new).unwrap());
        // last still points at the real previous deployment
        assert_eq!(
            io::read_link_target(&dir.path().join("last")).unwrap(),
            Some(old)
        );
    }

    #[test]
    fn stage_next_leaves_current_alone() {
        let (_dir, layout, old, new) = setup();
        layout.stage_next(&new).unwrap();
        assert!(layout.is_current(&old).unwrap());
        assert_eq!(layout.next().unwrap(), Some(new.clone()));

        layout.activate(&new).unwrap();
        assert_eq!(layout.next().unwrap(), None);
    }

    #[test]
    fn activate_without_current_creates_it() {
        let dir = TempDir::new().unwrap();
        let new = dir.path().join("v2");
        std::fs::create_dir(&new).unwrap();
        let layout = DeploymentLayout::new(dir.path());
        assert!(layout.activate(&new).unwrap());
        assert!(layout.is_current(&new).unwrap());
        assert!(!dir.path().join("last").exists());
    }

    #[test]
    fn missing_deployment_is_rejected() {
        let (dir, layout, _old, _new) = setup();
        let err = layout.activate(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, UpgradeError::DeploymentNotFound(_)));
    }
}
