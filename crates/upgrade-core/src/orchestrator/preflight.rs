use tracing::info;

use super::Upgrade;
use crate::environment;
use crate::error::{DisruptionCause, Result, UpgradeError};
use crate::memory;
use crate::step::{StepKind, StepRunner};
use crate::version;

const LOW_MEMORY_GUIDANCE: &str = "The build was run with the service still up and may have \
     been killed for lack of memory. Stop the service manually and re-run the upgrade.";

impl<R: StepRunner> Upgrade<'_, R> {
    /// Checks that run before anything touches the system.
    pub(super) fn preflight(&mut self) -> Result<()> {
        environment::check_privileges(self.config.require_root)?;
        self.flags.validate()?;
        self.flags.reconcile();

        if !self.deployment.is_dir() {
            return Err(UpgradeError::DeploymentNotFound(self.deployment.clone()));
        }
        self.resolve_versions()
    }

    fn resolve_versions(&mut self) -> Result<()> {
        let marker = &self.config.version_marker;
        let to = version::read_version(&self.deployment, marker)?;
        let from = match self.layout.current()? {
            Some(current) => version::read_version(&current, marker)?,
            None => None,
        };

        info!(
            "upgrading from {} to {}",
            from.as_deref().unwrap_or("an unknown version"),
            to.as_deref().unwrap_or("an unknown version")
        );
        if self.layout.is_current(&self.deployment)? {
            info!(
                "{} is already the current deployment; re-running upgrade steps",
                self.deployment.display()
            );
        }

        self.report.from_version = from;
        self.report.to_version = to;
        Ok(())
    }

    pub(super) fn check_compatibility(&mut self) -> Result<()> {
        if self.flags.skip_downgrade_check {
            info!("skipping database compatibility check (--skip-downgrade-check)");
            return Ok(());
        }
        self.exec(StepKind::CheckCompatibility, &[])?;
        Ok(())
    }

    /// Build or copy static assets. Low-memory hosts stop the service before
    /// a build, since the build competes with the live service for memory.
    pub(super) fn prepare_static_assets(&mut self) -> Result<()> {
        if self.flags.ignore_static_assets {
            info!("leaving static assets untouched (--ignore-static-assets)");
            return Ok(());
        }

        if !self.flags.from_git {
            if self.config.commands.copy_static_assets.is_empty() {
                info!("prebuilt deployment; static assets ship with it");
            } else {
                self.exec(StepKind::CopyStaticAssets, &[])?;
            }
            return Ok(());
        }

        let total = memory::total_memory_bytes(&self.config.meminfo_path)?;
        let threshold = self.config.memory_threshold_bytes;
        if total < threshold {
            if self.flags.unattended() {
                return Err(UpgradeError::DisruptionRequired(
                    DisruptionCause::BuildRequiresStop,
                ));
            }
            info!(
                "host has {} of memory (below {}); stopping the service before building static assets",
                memory::format_gib(total),
                memory::format_gib(threshold)
            );
            self.shutdown(false)?;
        } else {
            info!(
                "host has {} of memory; building static assets with the service running",
                memory::format_gib(total)
            );
        }

        match self.exec(StepKind::BuildStaticAssets, &[]) {
            Ok(_) => Ok(()),
            Err(e) => Err(UpgradeError::AssetBuildFailed {
                reason: e.to_string(),
                guidance: self
                    .state
                    .server_up
                    .then(|| LOW_MEMORY_GUIDANCE.to_string()),
            }),
        }
    }

    /// Generate any missing secrets; existing ones are kept.
    pub(super) fn generate_secrets(&mut self) -> Result<()> {
        self.exec(StepKind::GenerateSecrets, &[])?;
        Ok(())
    }
}
