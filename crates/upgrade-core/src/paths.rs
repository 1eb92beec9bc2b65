use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const SYSTEM_CONFIG_FILE: &str = "/etc/upgrade-deployment/config.yaml";
pub const DEFAULT_DEPLOYMENTS_DIR: &str = "/srv/app/deployments";
pub const DEFAULT_VERSION_MARKER: &str = "VERSION";

pub const CURRENT_LINK: &str = "current";
pub const LAST_LINK: &str = "last";
pub const NEXT_LINK: &str = "next";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn current_link(deployments: &Path) -> PathBuf {
    deployments.join(CURRENT_LINK)
}

pub fn last_link(deployments: &Path) -> PathBuf {
    deployments.join(LAST_LINK)
}

pub fn next_link(deployments: &Path) -> PathBuf {
    deployments.join(NEXT_LINK)
}

pub fn version_marker_path(deployment: &Path, marker: &str) -> PathBuf {
    deployment.join(marker)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_helpers() {
        let root = Path::new("/srv/app/deployments");
        assert_eq!(
            current_link(root),
            PathBuf::from("/srv/app/deployments/current")
        );
        assert_eq!(last_link(root), PathBuf::from("/srv/app/deployments/last"));
        assert_eq!(next_link(root), PathBuf::from("/srv/app/deployments/next"));
        assert_eq!(
            version_marker_path(&root.join("2024-05-01"), "VERSION"),
            PathBuf::from("/srv/app/deployments/2024-05-01/VERSION")
        );
    }
}
