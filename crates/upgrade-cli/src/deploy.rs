use anyhow::Context;
use std::path::{Path, PathBuf};

/// Resolve the deployment argument to an absolute directory.
///
/// Relative paths are taken from the current directory, and symlinks such as
/// `deployments/next` are followed so that the layout links point at the real
/// deployment.
pub fn resolve_deploy_path(path: &Path) -> anyhow::Result<PathBuf> {
    let resolved = path
        .canonicalize()
        .with_context(|| format!("deployment not found: {}", path.display()))?;
    if !resolved.is_dir() {
        anyhow::bail!("deployment is not a directory: {}", path.display());
    }
    Ok(resolved)
}
