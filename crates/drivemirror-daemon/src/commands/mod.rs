//! Subcommand implementations

pub mod auth;
pub mod config;
pub mod run;
pub mod service;

use std::path::Path;

use anyhow::{Context, Result};
use drivemirror_core::config::Config;
use tracing::info;

/// Loads the config file, or the defaults when it does not exist yet
///
/// A file that exists but does not parse is an error.
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        info!(path = %path.display(), "No config file, using defaults");
        return Ok(Config::default());
    }
    Config::load(path).with_context(|| format!("Failed to load config from {}", path.display()))
}

/// Fails with every validation problem listed
pub fn ensure_valid(config: &Config, path: &Path) -> Result<()> {
    let errors = config.validate();
    if errors.is_empty() {
        return Ok(());
    }
    let listed: Vec<String> = errors
        .iter()
        .map(|e| format!("{}: {}", e.field, e.message))
        .collect();
    anyhow::bail!(
        "Invalid configuration in {}:\n  {}",
        path.display(),
        listed.join("\n  ")
    )
}
