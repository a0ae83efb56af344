//! `config show|path|validate`

use std::path::Path;

use anyhow::{Context, Result};
use clap::Subcommand;

use super::load_config;
use crate::output::Output;

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration
    Show,
    /// Print the config file location
    Path,
    /// Check the configuration and list every problem
    Validate,
}

impl ConfigCommand {
    pub fn execute(&self, config_path: &Path, output: Output) -> Result<()> {
        match self {
            ConfigCommand::Show => show(config_path, output),
            ConfigCommand::Path => {
                if output.is_json() {
                    output.document(&serde_json::json!({
                        "path": config_path.display().to_string(),
                        "exists": config_path.exists(),
                    }));
                } else {
                    println!("{}", config_path.display());
                }
                Ok(())
            }
            ConfigCommand::Validate => validate(config_path, output),
        }
    }
}

fn show(config_path: &Path, output: Output) -> Result<()> {
    let config = load_config(config_path)?;
    if output.is_json() {
        let value =
            serde_json::to_value(&config).context("Failed to serialize configuration to JSON")?;
        output.document(&value);
    } else {
        let yaml =
            serde_yaml::to_string(&config).context("Failed to serialize configuration to YAML")?;
        println!("# {}", config_path.display());
        print!("{yaml}");
    }
    Ok(())
}

/// Exits non-zero when the configuration is invalid
fn validate(config_path: &Path, output: Output) -> Result<()> {
    let config = load_config(config_path)?;
    let errors = config.validate();

    output.document(&serde_json::json!({
        "path": config_path.display().to_string(),
        "valid": errors.is_empty(),
        "errors": errors
            .iter()
            .map(|e| serde_json::json!({ "field": e.field, "message": e.message }))
            .collect::<Vec<_>>(),
    }));

    if errors.is_empty() {
        output.success(&format!("{} is valid", config_path.display()));
        return Ok(());
    }
    output.failure(&format!("{} has {} problem(s)", config_path.display(), errors.len()));
    for error in &errors {
        output.detail(&format!("{}: {}", error.field, error.message));
    }
    anyhow::bail!("Configuration is invalid")
}
