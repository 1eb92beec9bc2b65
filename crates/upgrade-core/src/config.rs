use crate::environment::DEFAULT_SEARCH_PATH;
use crate::error::{Result, UpgradeError};
use crate::paths;
use crate::step::StepKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// PuppetExitCodes
// ---------------------------------------------------------------------------

/// Exit-status contract of the configuration-management dry run. Any code
/// not listed here is a tool error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PuppetExitCodes {
    #[serde(default = "default_no_changes")]
    pub no_changes: Vec<i32>,
    #[serde(default = "default_changes_pending")]
    pub changes_pending: Vec<i32>,
}

fn default_no_changes() -> Vec<i32> {
    vec![0]
}

fn default_changes_pending() -> Vec<i32> {
    vec![1]
}

impl Default for PuppetExitCodes {
    fn default() -> Self {
        Self {
            no_changes: default_no_changes(),
            changes_pending: default_changes_pending(),
        }
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

/// argv for each external collaborator. Relative programs are resolved
/// against the new deployment, which is also the working directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Commands {
    pub update_package_index: Vec<String>,
    pub upgrade_packages: Vec<String>,
    pub hold_packages: Vec<String>,
    pub unhold_packages: Vec<String>,
    pub generate_secrets: Vec<String>,
    pub check_compatibility: Vec<String>,
    pub build_static_assets: Vec<String>,
    /// Optional; empty means prebuilt packages ship their assets in place.
    pub copy_static_assets: Vec<String>,
    pub list_migrations: Vec<String>,
    pub apply_migrations: Vec<String>,
    pub puppet_check: Vec<String>,
    pub puppet_apply: Vec<String>,
    pub puppet_diff: Vec<String>,
    pub stop_server: Vec<String>,
    pub start_server: Vec<String>,
    pub restart_server: Vec<String>,
    pub fill_caches: Vec<String>,
    pub run_hooks: Vec<String>,
    pub reload_clients: Vec<String>,
    pub purge_old_deployments: Vec<String>,
    pub audit_fts_indexes: Vec<String>,
}

impl Default for Commands {
    fn default() -> Self {
        Self {
            update_package_index: argv(&["apt-get", "update"]),
            upgrade_packages: argv(&["apt-get", "-y", "upgrade"]),
            hold_packages: argv(&["apt-mark", "hold"]),
            unhold_packages: argv(&["apt-mark", "unhold"]),
            generate_secrets: argv(&["./scripts/setup/generate-secrets", "--production"]),
            check_compatibility: argv(&["./scripts/lib/check-database-compatibility"]),
            build_static_assets: argv(&["./tools/update-prod-static"]),
            copy_static_assets: Vec::new(),
            list_migrations: argv(&["./manage.py", "showmigrations"]),
            apply_migrations: argv(&["./manage.py", "migrate", "--noinput"]),
            puppet_check: argv(&["./scripts/puppet-apply", "--noop", "--force"]),
            puppet_apply: argv(&["./scripts/puppet-apply", "--force"]),
            puppet_diff: argv(&["./scripts/puppet-apply", "--noop", "--show-diff", "--force"]),
            stop_server: argv(&["./scripts/stop-server"]),
            start_server: argv(&["./scripts/start-server"]),
            restart_server: argv(&["./scripts/restart-server"]),
            fill_caches: argv(&["./manage.py", "fill_memcached_caches"]),
            run_hooks: argv(&["./scripts/run-hooks"]),
            reload_clients: argv(&["./scripts/reload-clients"]),
            purge_old_deployments: argv(&["./scripts/purge-old-deployments"]),
            audit_fts_indexes: argv(&["./manage.py", "audit_fts_indexes"]),
        }
    }
}

impl Commands {
    pub fn argv(&self, kind: StepKind) -> &[String] {
        match kind {
            StepKind::UpdatePackageIndex => &self.update_package_index,
            StepKind::UpgradePackages => &self.upgrade_packages,
            StepKind::HoldPackages => &self.hold_packages,
            StepKind::UnholdPackages => &self.unhold_packages,
            StepKind::GenerateSecrets => &self.generate_secrets,
            StepKind::CheckCompatibility => &self.check_compatibility,
            StepKind::BuildStaticAssets => &self.build_static_assets,
            StepKind::CopyStaticAssets => &self.copy_static_assets,
            StepKind::ListMigrations => &self.list_migrations,
            StepKind::ApplyMigrations => &self.apply_migrations,
            StepKind::PuppetCheck => &self.puppet_check,
            StepKind::PuppetApply | StepKind::PuppetApplyTags => &self.puppet_apply,
            StepKind::PuppetDiff => &self.puppet_diff,
            StepKind::StopServer => &self.stop_server,
            StepKind::StartServer => &self.start_server,
            StepKind::RestartServer => &self.restart_server,
            StepKind::FillCaches => &self.fill_caches,
            StepKind::RunHooks => &self.run_hooks,
            StepKind::ReloadClients => &self.reload_clients,
            StepKind::PurgeOldDeployments => &self.purge_old_deployments,
            StepKind::AuditFtsIndexes => &self.audit_fts_indexes,
        }
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_deployments_dir")]
    pub deployments_dir: PathBuf,
    /// File inside each deployment holding its version string.
    #[serde(default = "default_version_marker")]
    pub version_marker: String,
    #[serde(default = "default_require_root")]
    pub require_root: bool,
    #[serde(default = "default_search_path")]
    pub search_path: String,
    #[serde(default = "default_meminfo_path")]
    pub meminfo_path: PathBuf,
    /// Hosts with less physical memory than this stop the service before
    /// building static assets.
    #[serde(default = "default_memory_threshold")]
    pub memory_threshold_bytes: u64,
    /// `0` means no timeout.
    #[serde(default)]
    pub command_timeout_seconds: u64,
    /// Per-step overrides of `command_timeout_seconds`, keyed by step name.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub step_timeouts: HashMap<String, u64>,
    /// Packages held back during the OS package upgrade.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub held_packages: Vec<String>,
    /// Tags applied live before the critical section.
    #[serde(default = "default_hook_tags")]
    pub hook_tags: Vec<String>,
    #[serde(default)]
    pub puppet_exit_codes: PuppetExitCodes,
    #[serde(default)]
    pub commands: Commands,
}

fn default_deployments_dir() -> PathBuf {
    PathBuf::from(paths::DEFAULT_DEPLOYMENTS_DIR)
}

fn default_version_marker() -> String {
    paths::DEFAULT_VERSION_MARKER.to_string()
}

fn default_require_root() -> bool {
    true
}

fn default_search_path() -> String {
    DEFAULT_SEARCH_PATH.to_string()
}

fn default_meminfo_path() -> PathBuf {
    PathBuf::from("/proc/meminfo")
}

/// 4.2 GiB.
fn default_memory_threshold() -> u64 {
    4_509_715_660
}

fn default_hook_tags() -> Vec<String> {
    vec!["hooks".to_string()]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            deployments_dir: default_deployments_dir(),
            version_marker: default_version_marker(),
            require_root: default_require_root(),
            search_path: default_search_path(),
            meminfo_path: default_meminfo_path(),
            memory_threshold_bytes: default_memory_threshold(),
            command_timeout_seconds: 0,
            step_timeouts: HashMap::new(),
            held_packages: Vec::new(),
            hook_tags: default_hook_tags(),
            puppet_exit_codes: PuppetExitCodes::default(),
            commands: Commands::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(UpgradeError::ConfigNotFound(path.to_path_buf()));
        }
        let data = std::fs::read_to_string(path)?;
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    /// Load `explicit` if given (it must exist), else the system config if
    /// present, else built-in defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load(path),
            None => {
                let system = Path::new(paths::SYSTEM_CONFIG_FILE);
                if system.exists() {
                    Self::load(system)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        for kind in StepKind::all() {
            if *kind == StepKind::CopyStaticAssets {
                continue;
            }
            let argv = self.commands.argv(*kind);
            if argv.is_empty() || argv[0].trim().is_empty() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("command for step '{}' is empty", kind),
                });
            }
        }

        for step in self.step_timeouts.keys() {
            if !StepKind::is_valid(step) {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!("unknown step '{}' in step_timeouts", step),
                });
            }
        }

        if self.memory_threshold_bytes == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "memory_threshold_bytes is 0; static assets will always be built \
                          with the service running"
                    .to_string(),
            });
        }

        let codes = &self.puppet_exit_codes;
        if let Some(code) = codes
            .no_changes
            .iter()
            .find(|c| codes.changes_pending.contains(c))
        {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!(
                    "exit code {} is listed as both no_changes and changes_pending",
                    code
                ),
            });
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn empty_file_is_default_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "\n").unwrap();
        let cfg = Config::load(&path).unwrap();
        assert!(cfg.require_root);
        assert_eq!(cfg.memory_threshold_bytes, 4_509_715_660);
        assert_eq!(cfg.commands, Commands::default());
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn partial_commands_keep_defaults() {
        let yaml = "require_root: false\ncommands:\n  stop_server: [systemctl, stop, app]\n";
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(!cfg.require_root);
        assert_eq!(cfg.commands.argv(StepKind::StopServer), ["systemctl", "stop", "app"]);
        assert_eq!(
            cfg.commands.argv(StepKind::StartServer),
            ["./scripts/start-server"]
        );
    }

    #[test]
    fn missing_explicit_config_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = Config::resolve(Some(&dir.path().join("nope.yaml"))).unwrap_err();
        assert!(matches!(err, UpgradeError::ConfigNotFound(_)));
    }

    #[test]
    fn validate_flags_unknown_timeout_step() {
        let mut cfg = Config::default();
        cfg.step_timeouts.insert("migrate".to_string(), 60);
        cfg.step_timeouts.insert("apply_migrations".to_string(), 60);
        let warnings = cfg.validate();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("'migrate'"));
    }

    #[test]
    fn validate_flags_empty_required_command() {
        let mut cfg = Config::default();
        cfg.commands.stop_server = Vec::new();
        let warnings = cfg.validate();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].level, WarnLevel::Error);
    }

    #[test]
    fn validate_flags_overlapping_exit_codes() {
        let mut cfg = Config::default();
        cfg.puppet_exit_codes.changes_pending = vec![0, 2];
        let warnings = cfg.validate();
        assert!(warnings.iter().any(|w| w.message.contains("exit code 0")));
    }

    #[test]
    fn config_roundtrip() {
        let mut cfg = Config::default();
        cfg.held_packages = vec!["postgresql-16".to_string()];
        let yaml = serde_yaml::to_string(&cfg).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.held_packages, cfg.held_packages);
        assert_eq!(parsed.commands, cfg.commands);
    }
}
