use crate::error::Result;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Create a directory and all parents, idempotent.
pub fn ensure_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)?;
    Ok(())
}

/// Atomically point the symlink at `link` to `target`.
///
/// The new link is created in a temporary directory beside `link` and renamed
/// over it, so readers always see either the old or the new target.
pub fn atomic_symlink(link: &Path, target: &Path) -> Result<()> {
    let dir = link.parent().unwrap_or(Path::new("."));
    ensure_dir(dir)?;
    let staging = TempDir::new_in(dir)?;
    let staged = staging.path().join("link");
    std::os::unix::fs::symlink(target, &staged)?;
    std::fs::rename(&staged, link)?;
    Ok(())
}

/// Read the target of a symlink, resolving relative targets against the
/// link's directory. Returns `None` if `link` does not exist.
pub fn read_link_target(link: &Path) -> Result<Option<PathBuf>> {
    match std::fs::read_link(link) {
        Ok(target) if target.is_absolute() => Ok(Some(target)),
        Ok(target) => {
            let dir = link.parent().unwrap_or(Path::new("."));
            Ok(Some(dir.join(target)))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Remove a symlink if present.
pub fn remove_link(link: &Path) -> Result<bool> {
    match std::fs::remove_file(link) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_symlink_replaces_existing_link() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        std::fs::create_dir(&a).unwrap();
        std::fs::create_dir(&b).unwrap();
        let link = dir.path().join("current");

        atomic_symlink(&link, &a).unwrap();
        assert_eq!(read_link_target(&link).unwrap(), Some(a.clone()));
        atomic_symlink(&link, &b).unwrap();
        assert_eq!(read_link_target(&link).unwrap(), Some(b));

        // staging directories are cleaned up
        let entries = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 3);
    }

    #[test]
    fn relative_targets_resolve_against_link_dir() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("v1")).unwrap();
        let link = dir.path().join("current");
        std::os::unix::fs::symlink("v1", &link).unwrap();
        assert_eq!(
            read_link_target(&link).unwrap(),
            Some(dir.path().join("v1"))
        );
    }

    #[test]
    fn missing_link_reads_as_none() {
        let dir = TempDir::new().unwrap();
        assert_eq!(read_link_target(&dir.path().join("next")).unwrap(), None);
        assert!(!remove_link(&dir.path().join("next")).unwrap());
    }
}
