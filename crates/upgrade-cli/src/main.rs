mod deploy;
mod output;

use anyhow::Context;
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use tracing::{error, info, warn};
use upgrade_core::config::{Config, WarnLevel};
use upgrade_core::environment::{self, Environment};
use upgrade_core::flags::UpgradeFlags;
use upgrade_core::orchestrator::Upgrade;
use upgrade_core::step::ProcessRunner;

#[derive(Parser)]
#[command(
    name = "upgrade-deployment",
    about = "Upgrade a running deployment in place, stopping the service only when required",
    version
)]
struct Cli {
    /// Deployment directory to upgrade to
    deploy_path: PathBuf,

    /// Never disrupt the running service; abort if a restart would be needed
    #[arg(long)]
    skip_restart: bool,

    /// Do not apply configuration changes
    #[arg(long)]
    skip_puppet: bool,

    /// Do not check for or apply database migrations
    #[arg(long)]
    skip_migrations: bool,

    /// Skip the database compatibility check
    #[arg(long)]
    skip_downgrade_check: bool,

    /// Leave static assets untouched
    #[arg(long)]
    ignore_static_assets: bool,

    /// Keep old deployments on disk
    #[arg(long)]
    skip_purge_old_deployments: bool,

    /// Do not ask connected clients to reload
    #[arg(long)]
    skip_client_reloads: bool,

    /// Audit full-text search indexes after the upgrade
    #[arg(long)]
    audit_fts_indexes: bool,

    /// The deployment is a source checkout; build static assets
    #[arg(long)]
    from_git: bool,

    /// Restart faster, at the cost of dropping in-flight requests
    #[arg(long)]
    less_graceful: bool,

    /// Restart only the web application server
    #[arg(long)]
    only_web: bool,

    /// Config file (default: /etc/upgrade-deployment/config.yaml if present)
    #[arg(long, env = "UPGRADE_CONFIG")]
    config: Option<PathBuf>,

    /// Output the run report as JSON
    #[arg(long, short = 'j')]
    json: bool,

    /// Log each step's output
    #[arg(long, short = 'v')]
    verbose: bool,
}

impl Cli {
    fn flags(&self) -> UpgradeFlags {
        UpgradeFlags {
            skip_restart: self.skip_restart,
            skip_puppet: self.skip_puppet,
            skip_migrations: self.skip_migrations,
            skip_downgrade_check: self.skip_downgrade_check,
            ignore_static_assets: self.ignore_static_assets,
            skip_purge_old_deployments: self.skip_purge_old_deployments,
            skip_client_reloads: self.skip_client_reloads,
            audit_fts_indexes: self.audit_fts_indexes,
            from_git: self.from_git,
            less_graceful: self.less_graceful,
            only_web: self.only_web,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_ansi(std::io::stderr().is_terminal())
        .with_timer(tracing_subscriber::fmt::time::ChronoUtc::new(
            "%Y-%m-%d %H:%M:%S".to_string(),
        ))
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(&cli) {
        error!("{e:#}");
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let config = Config::resolve(cli.config.as_deref()).context("failed to load config")?;
    let mut fatal = false;
    for warning in config.validate() {
        match warning.level {
            WarnLevel::Warning => warn!("config: {}", warning.message),
            WarnLevel::Error => {
                error!("config: {}", warning.message);
                fatal = true;
            }
        }
    }
    if fatal {
        anyhow::bail!("invalid configuration");
    }

    environment::restrict_umask();
    let env = Environment::normalized(&config.search_path);

    let deployment = deploy::resolve_deploy_path(&cli.deploy_path)?;
    info!("deployment: {}", deployment.display());

    let runner = ProcessRunner::new(&deployment, env, &config);
    let mut upgrade = Upgrade::new(&config, deployment, cli.flags(), runner);
    let report = upgrade.run()?;

    if cli.json {
        output::print_json(&report)?;
    } else {
        output::print_report(&report);
    }
    Ok(())
}
