use tracing::{info, warn};

use super::Upgrade;
use crate::error::{DisruptionCause, Result, UpgradeError};
use crate::probe::{self, PuppetCheck};
use crate::state::ChangePlan;
use crate::step::{StepKind, StepRunner};

impl<R: StepRunner> Upgrade<'_, R> {
    /// Read-only probes deciding which disruptive steps are needed.
    pub(super) fn detect_changes(&mut self) -> Result<ChangePlan> {
        let migrations_needed = self.detect_migrations()?;
        let puppet_changes_pending = self.check_puppet()?;
        Ok(ChangePlan {
            migrations_needed,
            puppet_changes_pending,
        })
    }

    fn detect_migrations(&mut self) -> Result<bool> {
        if self.flags.skip_migrations {
            info!("skipping migration check (--skip-migrations)");
            return Ok(false);
        }
        if !self.state.server_up {
            info!("service is already stopped; assuming migrations are needed");
            return Ok(true);
        }

        let output = self.exec(StepKind::ListMigrations, &[])?;
        let pending = probe::pending_migrations(&output.stdout);
        if pending.is_empty() {
            info!("no pending migrations");
            Ok(false)
        } else {
            info!(
                "{} pending migration(s): {}",
                pending.len(),
                pending.join(", ")
            );
            Ok(true)
        }
    }

    /// Configuration dry run. A tool error aborts the run regardless of flags.
    pub(super) fn check_puppet(&mut self) -> Result<bool> {
        let step = self.step(StepKind::PuppetCheck, &[])?;
        let output = self.run_step(&step)?;
        match PuppetCheck::classify(output.code, &self.config.puppet_exit_codes) {
            PuppetCheck::NoChanges => {
                info!("no configuration changes found");
                Ok(false)
            }
            PuppetCheck::ChangesPending => {
                info!("configuration changes are pending");
                Ok(true)
            }
            PuppetCheck::Failed { code } => Err(UpgradeError::PuppetCheckFailed {
                code,
                output: output.combined(),
            }),
        }
    }

    /// In unattended mode, refuse to go on if anything would disrupt the
    /// service. Nothing disruptive has run at this point.
    pub(super) fn enforce_unattended(&self, plan: &ChangePlan) -> Result<()> {
        if !self.flags.unattended() || !plan.requires_disruption() {
            return Ok(());
        }
        if plan.migrations_needed {
            warn!("migrations are pending; an attended upgrade is required");
            return Err(UpgradeError::DisruptionRequired(
                DisruptionCause::MigrationsPending,
            ));
        }
        if plan.puppet_changes_pending {
            warn!("configuration changes are pending; an attended upgrade is required");
            return Err(UpgradeError::DisruptionRequired(
                DisruptionCause::PuppetChangesPending,
            ));
        }
        Ok(())
    }

    /// Apply the live-safe configuration tags, then re-check whether a full
    /// apply (and the downtime that comes with it) is still needed.
    pub(super) fn apply_live_hooks(&mut self, plan: ChangePlan) -> Result<ChangePlan> {
        if self.flags.skip_puppet {
            info!("not applying live-safe configuration (--skip-puppet)");
            return Ok(plan);
        }
        if self.config.hook_tags.is_empty() {
            info!("no live-safe configuration tags configured");
            return Ok(plan);
        }
        let tags = self.config.hook_tags.join(",");
        info!("applying live-safe configuration ({tags})");
        self.exec(StepKind::PuppetApplyTags, &["--tags".to_string(), tags])?;

        if !plan.puppet_changes_pending {
            return Ok(plan);
        }
        let still_pending = self.check_puppet()?;
        if !still_pending {
            info!("only live-safe configuration changes were pending; skipping full apply");
        }
        Ok(ChangePlan {
            puppet_changes_pending: still_pending,
            ..plan
        })
    }
}
