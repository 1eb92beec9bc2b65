use tracing::{info, warn};

use super::Upgrade;
use crate::error::Result;
use crate::state::ChangePlan;
use crate::step::{StepKind, StepRunner};

impl<R: StepRunner> Upgrade<'_, R> {
    /// Stop, mutate, start. Each stop happens only if a probe required it.
    pub(super) fn critical_section(&mut self, plan: &ChangePlan) -> Result<()> {
        self.run_hooks("pre-deploy")?;

        if !plan.puppet_changes_pending {
            info!("no configuration changes to apply");
        } else if self.flags.skip_puppet {
            info!("configuration changes are pending but --skip-puppet was given; not applying");
        } else {
            self.shutdown(!plan.migrations_needed)?;
            info!("applying configuration changes");
            self.exec(StepKind::PuppetApply, &[])?;
            self.report.puppet_applied = true;
            // The apply may pull in new packages and may start dependent
            // services as a side effect.
            self.upgrade_packages(false)?;
            self.state.server_up = true;
        }

        if plan.migrations_needed {
            if self.state.server_up {
                self.shutdown(false)?;
            }
            info!("applying database migrations");
            self.exec(StepKind::ApplyMigrations, &[])?;
            self.report.migrations_applied = true;
        } else {
            info!("no migrations to apply");
        }

        self.layout.activate(&self.deployment)?;
        self.start_or_restart()?;

        self.run_hooks("post-deploy")?;
        self.notify_clients();
        Ok(())
    }

    /// `start` if the service is stopped, otherwise a graceful `restart`.
    fn start_or_restart(&mut self) -> Result<()> {
        let mut args = Vec::new();
        if !self.state.caches_filled {
            args.push("--fill-cache".to_string());
        }
        if self.flags.skip_client_reloads {
            args.push("--skip-client-reloads".to_string());
        }
        if self.flags.less_graceful {
            args.push("--less-graceful".to_string());
        }

        if self.state.server_up {
            if self.flags.only_web {
                args.push("--only-web".to_string());
            }
            info!("restarting the service");
            self.exec(StepKind::RestartServer, &args)?;
        } else {
            info!("starting the service");
            self.exec(StepKind::StartServer, &args)?;
        }

        self.state.server_up = true;
        self.state.caches_filled = true;
        self.report.restarted = true;
        Ok(())
    }

    fn run_hooks(&mut self, stage: &str) -> Result<()> {
        let mut args = vec![
            stage.to_string(),
            "--from-version".to_string(),
            self.report
                .from_version
                .clone()
                .unwrap_or_else(|| "unknown".to_string()),
            "--to-version".to_string(),
            self.report
                .to_version
                .clone()
                .unwrap_or_else(|| "unknown".to_string()),
        ];
        if self.flags.from_git {
            args.push("--from-git".to_string());
        }
        self.exec(StepKind::RunHooks, &args)?;
        Ok(())
    }

    /// Ask connected clients to reload. Best-effort and not waited on.
    fn notify_clients(&mut self) {
        if self.flags.skip_client_reloads {
            info!("not reloading clients (--skip-client-reloads)");
            return;
        }
        let step = match self.step(StepKind::ReloadClients, &[]) {
            Ok(step) => step,
            Err(e) => {
                warn!("cannot reload clients: {e}");
                return;
            }
        };
        match self.runner.spawn_background(&step) {
            Ok(()) => {
                info!("reloading clients in the background");
                self.report.record_background(&step);
            }
            Err(e) => warn!("failed to start client reload: {e}"),
        }
    }

    /// Unattended counterpart of the critical section: nothing disruptive is
    /// needed, so record the deployment as next and leave the service alone.
    pub(super) fn stage(&mut self) -> Result<()> {
        info!("no changes necessary; not restarting (--skip-restart)");
        self.layout.stage_next(&self.deployment)?;
        Ok(())
    }
}
