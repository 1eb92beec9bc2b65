use tracing::info;

use super::Upgrade;
use crate::error::{Result, UpgradeError};
use crate::probe::PuppetCheck;
use crate::state::ChangePlan;
use crate::step::{StepKind, StepRunner};

impl<R: StepRunner> Upgrade<'_, R> {
    /// Work that is safe with the service running.
    pub(super) fn maintenance(&mut self, plan: &ChangePlan) -> Result<()> {
        if self.flags.audit_fts_indexes {
            info!("auditing full-text search indexes");
            self.exec(StepKind::AuditFtsIndexes, &[])?;
        }

        if self.flags.skip_purge_old_deployments {
            info!("keeping old deployments (--skip-purge-old-deployments)");
        } else {
            self.exec(StepKind::PurgeOldDeployments, &[])?;
        }

        if plan.puppet_changes_pending && !self.report.puppet_applied {
            self.show_unapplied_diff()?;
        }
        Ok(())
    }

    fn show_unapplied_diff(&mut self) -> Result<()> {
        info!("configuration changes were detected but not applied; showing diff");
        let step = self.step(StepKind::PuppetDiff, &[])?;
        let output = self.run_step(&step)?;
        if let PuppetCheck::Failed { code } =
            PuppetCheck::classify(output.code, &self.config.puppet_exit_codes)
        {
            return Err(UpgradeError::PuppetCheckFailed {
                code,
                output: output.combined(),
            });
        }
        for line in output.stdout.lines() {
            info!("  {line}");
        }
        self.report.unapplied_puppet_diff = Some(output.stdout);
        Ok(())
    }
}
