use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Why an unattended run refused to continue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisruptionCause {
    MigrationsPending,
    PuppetChangesPending,
    BuildRequiresStop,
}

impl fmt::Display for DisruptionCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DisruptionCause::MigrationsPending => "database migrations are pending",
            DisruptionCause::PuppetChangesPending => "configuration changes are pending",
            DisruptionCause::BuildRequiresStop => {
                "building static assets on this host requires stopping the service first"
            }
        })
    }
}

#[derive(Debug, Error)]
pub enum UpgradeError {
    #[error("must be run as root (effective uid is {0})")]
    NotPrivileged(u32),

    #[error("incompatible flags: {0}")]
    IncompatibleFlags(String),

    #[error("deployment not found: {}", .0.display())]
    DeploymentNotFound(PathBuf),

    #[error("config file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),

    #[error("no command configured for step '{0}'")]
    EmptyCommand(String),

    #[error("failed to spawn '{step}': {reason}")]
    StepSpawn { step: String, reason: String },

    #[error("step '{step}' exited with status {code}{}", output_tail(.output))]
    StepFailed {
        step: String,
        code: i32,
        output: String,
    },

    #[error("step '{step}' timed out after {seconds}s")]
    StepTimedOut { step: String, seconds: u64 },

    #[error("configuration dry run failed with exit code {code}{}", output_tail(.output))]
    PuppetCheckFailed { code: i32, output: String },

    #[error("static asset build failed: {reason}{}", guidance_suffix(.guidance))]
    AssetBuildFailed {
        reason: String,
        guidance: Option<String>,
    },

    #[error("refusing to continue with --skip-restart: {0}")]
    DisruptionRequired(DisruptionCause),

    #[error("invalid memory info: {0}")]
    MemInfo(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, UpgradeError>;

fn output_tail(output: &str) -> String {
    if output.is_empty() {
        String::new()
    } else {
        format!(":\n{output}")
    }
}

fn guidance_suffix(guidance: &Option<String>) -> String {
    match guidance {
        Some(g) => format!("\n{g}"),
        None => String::new(),
    }
}
