//! Tracing subscriber setup
//!
//! `RUST_LOG` wins over everything; otherwise `-v` / `-vv` raise the level
//! and `logging.level` from the config is the fallback. The long-running
//! commands append to `logging.file` when one is configured, everything
//! else logs to stderr.

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use drivemirror_core::config::{expand_tilde, LoggingConfig};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

/// Where log lines go
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    /// `logging.file` if set, else stderr
    Configured,
    Stderr,
}

/// Installs the global subscriber; call once per process
pub fn init(config: &LoggingConfig, verbose: u8, target: LogTarget) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => {
            let directive = filter_directive(&config.level, verbose);
            EnvFilter::try_new(&directive)
                .with_context(|| format!("Invalid log level '{directive}'"))?
        }
    };

    let file = match (target, &config.file) {
        (LogTarget::Configured, Some(path)) => Some(open_append(&expand_tilde(path))?),
        _ => None,
    };
    let ansi = file.is_none();
    let writer = match file {
        Some(file) => BoxMakeWriter::new(Mutex::new(file)),
        None => BoxMakeWriter::new(std::io::stderr),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(ansi)
        .with_target(true);
    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| anyhow::anyhow!("Failed to initialise logging: {e}"))
}

/// Level directive from the config level and the `-v` count
fn filter_directive(level: &str, verbose: u8) -> String {
    match verbose {
        0 => level.to_string(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

fn open_append(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))
}
