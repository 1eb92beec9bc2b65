//! The minimal-downtime upgrade procedure.
//!
//! A run walks a fixed sequence and only interrupts the service for work the
//! probes proved necessary:
//!
//! 1. pre-flight: privileges, flag validation, version logging
//! 2. compatibility guard
//! 3. static assets (stopping first on low-memory hosts)
//! 4. secrets
//! 5. change detection: pending migrations, configuration dry run
//! 6. unattended guard, then either staging (unattended) or
//!    packages, live-safe hooks and the critical section
//! 7. maintenance
//!
//! Every external call goes through [`Upgrade::exec`], so any failure aborts
//! the run. There is no rollback; re-running the upgrade is the recovery path.

mod critical;
mod detect;
mod maintenance;
mod preflight;


use std::path::PathBuf;

use tracing::{debug, info};

use crate::config::Config;
use crate::deployment::DeploymentLayout;
use crate::error::{Result, UpgradeError};
use crate::flags::UpgradeFlags;
use crate::report::{Outcome, UpgradeReport};
use crate::state::ServiceState;
use crate::step::{Step, StepKind, StepOutput, StepRunner};

pub struct Upgrade<'a, R: StepRunner> {
    config: &'a Config,
    flags: UpgradeFlags,
    deployment: PathBuf,
    layout: DeploymentLayout,
    runner: R,
    state: ServiceState,
    report: UpgradeReport,
}

impl<'a, R: StepRunner> Upgrade<'a, R> {
    pub fn new(config: &'a Config, deployment: PathBuf, flags: UpgradeFlags, runner: R) -> Self {
        let report = UpgradeReport::new(deployment.clone(), flags.unattended());
        Self {
            config,
            flags,
            layout: DeploymentLayout::new(&config.deployments_dir),
            deployment,
            runner,
            state: ServiceState::default(),
            report,
        }
    }

    pub fn run(&mut self) -> Result<UpgradeReport> {
        self.preflight()?;
        self.check_compatibility()?;
        self.prepare_static_assets()?;
        self.generate_secrets()?;

        let mut plan = self.detect_changes()?;
        self.report.plan = plan;
        self.enforce_unattended(&plan)?;

        let outcome = if self.flags.unattended() {
            self.stage()?;
            Outcome::Staged
        } else {
            self.upgrade_packages(true)?;
            plan = self.apply_live_hooks(plan)?;
            self.report.plan = plan;
            self.critical_section(&plan)?;
            Outcome::Upgraded
        };

        self.maintenance(&plan)?;
        self.report.finish(outcome);
        info!(
            "upgrade finished: {}",
            match outcome {
                Outcome::Upgraded => "new deployment is live",
                Outcome::Staged => "new deployment is staged, service untouched",
            }
        );
        Ok(self.report.clone())
    }

    // -----------------------------------------------------------------------
    // Step execution
    // -----------------------------------------------------------------------

    fn step(&self, kind: StepKind, extra: &[String]) -> Result<Step> {
        Step::new(kind, self.config.commands.argv(kind), extra)
    }

    /// Run a step and record it, whatever its exit status.
    fn run_step(&mut self, step: &Step) -> Result<StepOutput> {
        info!("running {}: {}", step.kind, step.command_line());
        let output = self.runner.run(step)?;
        self.report.record(step, &output);
        debug!(
            step = step.kind.as_str(),
            code = output.code,
            duration_ms = output.duration_ms,
            "step finished"
        );
        Ok(output)
    }

    /// Run a step that must succeed.
    fn exec(&mut self, kind: StepKind, extra: &[String]) -> Result<StepOutput> {
        let step = self.step(kind, extra)?;
        let output = self.run_step(&step)?;
        if !output.success() {
            return Err(UpgradeError::StepFailed {
                step: kind.as_str().to_string(),
                code: output.code,
                output: output.combined(),
            });
        }
        Ok(output)
    }

    // -----------------------------------------------------------------------
    // Service lifecycle
    // -----------------------------------------------------------------------

    /// Warm caches once per run.
    fn fill_caches(&mut self) -> Result<()> {
        if self.state.caches_filled {
            debug!("caches already filled");
            return Ok(());
        }
        info!("filling caches before stopping the service");
        self.exec(StepKind::FillCaches, &[])?;
        self.state.caches_filled = true;
        Ok(())
    }

    /// Stop the service. `fill_caches` warms caches first; callers pass
    /// `false` once migrations are known or assumed to be needed, since they
    /// invalidate that work. No-op if the service is already down.
    fn shutdown(&mut self, fill_caches: bool) -> Result<()> {
        if !self.state.server_up {
            debug!("service is already stopped");
            return Ok(());
        }
        if fill_caches {
            self.fill_caches()?;
        }
        info!("stopping the service");
        self.exec(StepKind::StopServer, &[])?;
        self.state.server_up = false;
        Ok(())
    }

    /// Update the package index (optionally) and upgrade OS packages, holding
    /// `held_packages` for the duration.
    fn upgrade_packages(&mut self, refresh_index: bool) -> Result<()> {
        if refresh_index {
            self.exec(StepKind::UpdatePackageIndex, &[])?;
        }
        let config = self.config;
        if config.held_packages.is_empty() {
            self.exec(StepKind::UpgradePackages, &[])?;
            return Ok(());
        }

        info!("holding {} during package upgrade", config.held_packages.join(", "));
        self.exec(StepKind::HoldPackages, &config.held_packages)?;
        let upgraded = self.exec(StepKind::UpgradePackages, &[]);
        let released = self.exec(StepKind::UnholdPackages, &config.held_packages);
        upgraded?;
        released?;
        Ok(())
    }
}
