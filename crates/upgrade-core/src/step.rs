//! Uniform invocation of external collaborators.
//!
//! Every shell-out the upgrade performs is a [`Step`]: a [`StepKind`] naming
//! the collaborator action plus the argv to execute. A [`StepRunner`] turns a
//! step into a [`StepOutput`]; callers decide what a non-zero exit means. The
//! production runner is [`ProcessRunner`], which runs the command in the new
//! deployment with the normalized environment and an optional timeout.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Config;
use crate::environment::Environment;
use crate::error::{Result, UpgradeError};

// ---------------------------------------------------------------------------
// StepKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    UpdatePackageIndex,
    UpgradePackages,
    HoldPackages,
    UnholdPackages,
    GenerateSecrets,
    CheckCompatibility,
    BuildStaticAssets,
    CopyStaticAssets,
    ListMigrations,
    ApplyMigrations,
    PuppetCheck,
    PuppetApply,
    PuppetApplyTags,
    PuppetDiff,
    StopServer,
    StartServer,
    RestartServer,
    FillCaches,
    RunHooks,
    ReloadClients,
    PurgeOldDeployments,
    AuditFtsIndexes,
}

impl StepKind {
    pub fn all() -> &'static [StepKind] {
        &[
            StepKind::UpdatePackageIndex,
            StepKind::UpgradePackages,
            StepKind::HoldPackages,
            StepKind::UnholdPackages,
            StepKind::GenerateSecrets,
            StepKind::CheckCompatibility,
            StepKind::BuildStaticAssets,
            StepKind::CopyStaticAssets,
            StepKind::ListMigrations,
            StepKind::ApplyMigrations,
            StepKind::PuppetCheck,
            StepKind::PuppetApply,
            StepKind::PuppetApplyTags,
            StepKind::PuppetDiff,
            StepKind::StopServer,
            StepKind::StartServer,
            StepKind::RestartServer,
            StepKind::FillCaches,
            StepKind::RunHooks,
            StepKind::ReloadClients,
            StepKind::PurgeOldDeployments,
            StepKind::AuditFtsIndexes,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StepKind::UpdatePackageIndex => "update_package_index",
            StepKind::UpgradePackages => "upgrade_packages",
            StepKind::HoldPackages => "hold_packages",
            StepKind::UnholdPackages => "unhold_packages",
            StepKind::GenerateSecrets => "generate_secrets",
            StepKind::CheckCompatibility => "check_compatibility",
            StepKind::BuildStaticAssets => "build_static_assets",
            StepKind::CopyStaticAssets => "copy_static_assets",
            StepKind::ListMigrations => "list_migrations",
            StepKind::ApplyMigrations => "apply_migrations",
            StepKind::PuppetCheck => "puppet_check",
            StepKind::PuppetApply => "puppet_apply",
            StepKind::PuppetApplyTags => "puppet_apply_tags",
            StepKind::PuppetDiff => "puppet_diff",
            StepKind::StopServer => "stop_server",
            StepKind::StartServer => "start_server",
            StepKind::RestartServer => "restart_server",
            StepKind::FillCaches => "fill_caches",
            StepKind::RunHooks => "run_hooks",
            StepKind::ReloadClients => "reload_clients",
            StepKind::PurgeOldDeployments => "purge_old_deployments",
            StepKind::AuditFtsIndexes => "audit_fts_indexes",
        }
    }

    pub fn is_valid(s: &str) -> bool {
        Self::all().iter().any(|k| k.as_str() == s)
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Step / StepOutput
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub kind: StepKind,
    pub argv: Vec<String>,
}

impl Step {
    /// Build a step from a configured argv plus per-invocation arguments.
    pub fn new(kind: StepKind, base: &[String], extra: &[String]) -> Result<Self> {
        if base.is_empty() || base[0].trim().is_empty() {
            return Err(UpgradeError::EmptyCommand(kind.as_str().to_string()));
        }
        let mut argv = base.to_vec();
        argv.extend(extra.iter().cloned());
        Ok(Self { kind, argv })
    }

    pub fn command_line(&self) -> String {
        self.argv.join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutput {
    /// Exit code; `-1` when the process was terminated by a signal.
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl StepOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }

    /// Combine stdout/stderr and cap to 10KB (keeping the tail).
    pub fn combined(&self) -> String {
        let output = if self.stderr.trim().is_empty() {
            self.stdout.clone()
        } else if self.stdout.trim().is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout.trim_end(), self.stderr)
        };
        const MAX_OUTPUT: usize = 10 * 1024;
        let trimmed = output.trim();
        if trimmed.len() > MAX_OUTPUT {
            let mut start = trimmed.len() - MAX_OUTPUT;
            while !trimmed.is_char_boundary(start) {
                start += 1;
            }
            trimmed[start..].to_string()
        } else {
            trimmed.to_string()
        }
    }
}

// ---------------------------------------------------------------------------
// StepRunner
// ---------------------------------------------------------------------------

pub trait StepRunner {
    /// Run a step to completion. Spawn failures and timeouts are errors; a
    /// non-zero exit is reported in the output and left to the caller.
    fn run(&mut self, step: &Step) -> Result<StepOutput>;

    /// Start a step without waiting for it.
    fn spawn_background(&mut self, step: &Step) -> Result<()>;
}

/// Runs steps as child processes of the current process.
pub struct ProcessRunner {
    cwd: PathBuf,
    env: Environment,
    default_timeout: u64,
    step_timeouts: std::collections::HashMap<String, u64>,
}

impl ProcessRunner {
    pub fn new(cwd: &Path, env: Environment, config: &Config) -> Self {
        Self {
            cwd: cwd.to_path_buf(),
            env,
            default_timeout: config.command_timeout_seconds,
            step_timeouts: config.step_timeouts.clone(),
        }
    }

    /// `None` means wait indefinitely.
    fn timeout_for(&self, kind: StepKind) -> Option<Duration> {
        let secs = self
            .step_timeouts
            .get(kind.as_str())
            .copied()
            .unwrap_or(self.default_timeout);
        (secs > 0).then(|| Duration::from_secs(secs))
    }

    /// Resolve `argv[0]`: relative paths against the deployment, bare names
    /// against the normalized search path.
    fn resolve_program(&self, step: &Step) -> Result<PathBuf> {
        let program = Path::new(&step.argv[0]);
        if program.is_absolute() {
            return Ok(program.to_path_buf());
        }
        if step.argv[0].contains('/') {
            return Ok(self.cwd.join(program));
        }
        which::which_in(program, Some(self.env.search_path()), &self.cwd).map_err(|e| {
            UpgradeError::StepSpawn {
                step: step.kind.as_str().to_string(),
                reason: format!("'{}' not found on {}: {e}", step.argv[0], self.env.search_path()),
            }
        })
    }

    fn command(&self, step: &Step) -> Result<Command> {
        let mut cmd = Command::new(self.resolve_program(step)?);
        cmd.args(&step.argv[1..])
            .current_dir(&self.cwd)
            .envs(self.env.vars().iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null());
        Ok(cmd)
    }
}

impl StepRunner for ProcessRunner {
    fn run(&mut self, step: &Step) -> Result<StepOutput> {
        let start = Instant::now();
        let mut child = self
            .command(step)?
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| UpgradeError::StepSpawn {
                step: step.kind.as_str().to_string(),
                reason: e.to_string(),
            })?;

        let child_pid = child.id();

        // Read stdout/stderr in dedicated threads to avoid pipe-buffer deadlocks
        let stdout_handle = child.stdout.take();
        let stderr_handle = child.stderr.take();
        let stdout_thread = std::thread::spawn(move || -> String {
            let mut buf = String::new();
            if let Some(mut r) = stdout_handle {
                let _ = r.read_to_string(&mut buf);
            }
            buf
        });
        let stderr_thread = std::thread::spawn(move || -> String {
            let mut buf = String::new();
            if let Some(mut r) = stderr_handle {
                let _ = r.read_to_string(&mut buf);
            }
            buf
        });

        let wait_result = match self.timeout_for(step.kind) {
            None => child.wait(),
            Some(timeout) => {
                // The child moves to a waiter thread; on timeout we kill by PID.
                let (tx, rx) = std::sync::mpsc::channel();
                std::thread::spawn(move || {
                    let _ = tx.send(child.wait());
                });
                match rx.recv_timeout(timeout) {
                    Ok(result) => result,
                    Err(_) => {
                        kill_process(child_pid);
                        return Err(UpgradeError::StepTimedOut {
                            step: step.kind.as_str().to_string(),
                            seconds: timeout.as_secs(),
                        });
                    }
                }
            }
        };

        let stdout = stdout_thread.join().unwrap_or_default();
        let stderr = stderr_thread.join().unwrap_or_default();
        let status = wait_result.map_err(|e| UpgradeError::StepSpawn {
            step: step.kind.as_str().to_string(),
            reason: format!("wait failed: {e}"),
        })?;

        for line in stdout.lines().chain(stderr.lines()) {
            debug!(step = step.kind.as_str(), "{line}");
        }

        Ok(StepOutput {
            code: status.code().unwrap_or(-1),
            stdout,
            stderr,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    fn spawn_background(&mut self, step: &Step) -> Result<()> {
        self.command(step)?
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| UpgradeError::StepSpawn {
                step: step.kind.as_str().to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }
}

/// Terminate a process by PID using SIGKILL. Best-effort.
fn kill_process(pid: u32) {
    // SAFETY: kill(2) has no memory-safety preconditions.
    unsafe {
        libc::kill(pid as libc::pid_t, libc::SIGKILL);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
