//! drivemirrord - keeps a local directory mirrored with a Google Drive folder
//!
//! `run` starts both control paths and stays in the foreground until
//! SIGINT or SIGTERM; it is what the systemd user unit executes. The other
//! subcommands are one-shot helpers around it:
//!
//! - `sync-once` - a single reconciliation cycle
//! - `auth login|status|logout` - OAuth credentials
//! - `service install|uninstall|start|stop|status` - the systemd user unit
//! - `config show|path|validate` - the YAML config file
//!
//! Only failing to authenticate at startup (or an unusable config) ends
//! `run` with a non-zero exit; everything after that is logged and retried
//! on the next cycle.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use drivemirror_core::config::Config;
use tracing::{error, info};

mod commands;
mod logging;
mod output;

use commands::{auth::AuthCommand, config::ConfigCommand, service::ServiceCommand};
use logging::LogTarget;
use output::{Output, OutputFormat};

#[derive(Debug, Parser)]
#[command(
    name = "drivemirrord",
    version,
    about = "Mirror a local folder with a Google Drive folder"
)]
struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose logging (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use an alternate config file
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the sync service in the foreground
    Run,
    /// Run one reconciliation cycle and exit
    SyncOnce,
    /// Manage Google Drive credentials
    #[command(subcommand)]
    Auth(AuthCommand),
    /// Manage the systemd user service
    #[command(subcommand)]
    Service(ServiceCommand),
    /// View and check the configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Commands {
    fn log_target(&self) -> LogTarget {
        match self {
            Commands::Run | Commands::SyncOnce => LogTarget::Configured,
            _ => LogTarget::Stderr,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);

    // Logging has to exist before the command loads the config for real, so
    // a broken file falls back to the default logging section here.
    let target = cli.command.log_target();
    let mut log_config = Config::load(&config_path).unwrap_or_default().logging;
    if target == LogTarget::Stderr && cli.verbose == 0 {
        log_config.level = "warn".to_string();
    }
    logging::init(&log_config, cli.verbose, target)?;

    let output = Output::new(OutputFormat::from_flag(cli.json));
    let result = match &cli.command {
        Commands::Run => {
            info!(
                version = env!("CARGO_PKG_VERSION"),
                config = %config_path.display(),
                "drivemirror starting"
            );
            commands::run::run(&config_path).await
        }
        Commands::SyncOnce => commands::run::sync_once(&config_path, output).await,
        Commands::Auth(cmd) => cmd.execute(&config_path, output).await,
        Commands::Service(cmd) => cmd.execute(&config_path, output),
        Commands::Config(cmd) => cmd.execute(&config_path, output),
    };

    // One-shot commands already print the error on stderr
    if let (Err(e), LogTarget::Configured) = (&result, target) {
        error!(error = %format!("{e:#}"), "drivemirrord exiting with error");
    }
    result
}
