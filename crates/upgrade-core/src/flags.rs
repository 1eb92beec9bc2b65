//! Invocation flags and their consistency rules.

use serde::Serialize;
use tracing::warn;

use crate::error::{Result, UpgradeError};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpgradeFlags {
    /// Unattended mode: configure the new deployment but never disrupt the
    /// running service; abort instead.
    pub skip_restart: bool,
    pub skip_puppet: bool,
    pub skip_migrations: bool,
    pub skip_downgrade_check: bool,
    pub ignore_static_assets: bool,
    pub skip_purge_old_deployments: bool,
    pub skip_client_reloads: bool,
    pub audit_fts_indexes: bool,
    /// The deployment is an unbuilt source tree; static assets must be built.
    pub from_git: bool,
    pub less_graceful: bool,
    /// Restart only the web application server.
    pub only_web: bool,
}

impl UpgradeFlags {
    pub fn unattended(&self) -> bool {
        self.skip_restart
    }

    /// Reject contradictory combinations before any work begins.
    pub fn validate(&self) -> Result<()> {
        if self.only_web && self.skip_client_reloads {
            return Err(UpgradeError::IncompatibleFlags(
                "--only-web cannot be combined with --skip-client-reloads".to_string(),
            ));
        }
        Ok(())
    }

    /// Turn off flags that only matter when actually restarting, warning
    /// once per overridden flag.
    pub fn reconcile(&mut self) {
        if !self.skip_restart {
            return;
        }
        let mut overridden = Vec::new();
        if self.less_graceful {
            self.less_graceful = false;
            overridden.push("ignoring --less-graceful; --skip-restart never restarts".to_string());
        }
        if self.skip_migrations {
            self.skip_migrations = false;
            overridden.push(
                "ignoring --skip-migrations; --skip-restart must check for pending migrations"
                    .to_string(),
            );
        }
        if self.skip_puppet {
            self.skip_puppet = false;
            overridden.push(
                "ignoring --skip-puppet; --skip-restart must check for configuration changes"
                    .to_string(),
            );
        }
        for message in &overridden {
            warn!("{message}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_web_with_skip_client_reloads_is_rejected() {
        let flags = UpgradeFlags {
            only_web: true,
            skip_client_reloads: true,
            ..Default::default()
        };
        assert!(matches!(
            flags.validate(),
            Err(UpgradeError::IncompatibleFlags(_))
        ));
    }

    #[test]
    fn only_web_alone_is_fine() {
        let flags = UpgradeFlags {
            only_web: true,
            ..Default::default()
        };
        assert!(flags.validate().is_ok());
    }

    #[test]
    fn unattended_overrides_restart_only_flags() {
        let mut flags = UpgradeFlags {
            skip_restart: true,
            less_graceful: true,
            skip_migrations: true,
            skip_puppet: true,
            skip_purge_old_deployments: true,
            ..Default::default()
        };
        flags.reconcile();
        assert!(!flags.less_graceful);
        assert!(!flags.skip_migrations);
        assert!(!flags.skip_puppet);
        assert!(flags.skip_purge_old_deployments);
    }

    #[test]
    fn attended_flags_are_untouched() {
        let mut flags = UpgradeFlags {
            less_graceful: true,
            skip_migrations: true,
            ..Default::default()
        };
        let before = flags.clone();
        flags.reconcile();
        assert_eq!(flags, before);
    }
}
