//! `service install|uninstall|start|stop|status`
//!
//! Manages a systemd user unit that runs `drivemirrord run` in the
//! background. All calls go through `systemctl --user`.

use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result};
use clap::Subcommand;
use tracing::info;

use super::load_config;
use crate::output::Output;

/// systemd unit name
const SYSTEMD_UNIT: &str = "drivemirror.service";

/// Extra seconds systemd waits beyond our own shutdown deadline
const STOP_GRACE_SECS: u64 = 5;

#[derive(Debug, Subcommand)]
pub enum ServiceCommand {
    /// Write the systemd user unit and enable it
    Install,
    /// Stop, disable and remove the systemd user unit
    Uninstall,
    /// Start the background service
    Start,
    /// Stop the background service
    Stop,
    /// Show whether the background service is running
    Status,
}

impl ServiceCommand {
    pub fn execute(&self, config_path: &Path, output: Output) -> Result<()> {
        match self {
            ServiceCommand::Install => install(config_path, output),
            ServiceCommand::Uninstall => uninstall(output),
            ServiceCommand::Start => simple_action("start", "Service started", output),
            ServiceCommand::Stop => simple_action("stop", "Service stopped", output),
            ServiceCommand::Status => status(output),
        }
    }
}

/// `~/.config/systemd/user/drivemirror.service`
fn unit_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir().context("Cannot determine the user config directory")?;
    Ok(config_dir.join("systemd").join("user").join(SYSTEMD_UNIT))
}

/// Contents of the unit file
fn render_unit(exe: &Path, config_path: &Path, shutdown_timeout_secs: u64) -> String {
    format!(
        "[Unit]\n\
         Description=drivemirror folder sync with Google Drive\n\
         After=network-online.target\n\
         Wants=network-online.target\n\
         \n\
         [Service]\n\
         Type=simple\n\
         ExecStart=\"{exe}\" --config \"{config}\" run\n\
         Restart=on-failure\n\
         RestartSec=30\n\
         TimeoutStopSec={stop}\n\
         \n\
         [Install]\n\
         WantedBy=default.target\n",
        exe = exe.display(),
        config = config_path.display(),
        stop = shutdown_timeout_secs + STOP_GRACE_SECS,
    )
}

/// Runs `systemctl --user <args>`, failing with its stderr
fn systemctl(args: &[&str]) -> Result<std::process::Output> {
    info!(?args, "Running systemctl --user");
    Command::new("systemctl")
        .arg("--user")
        .args(args)
        .output()
        .context("Failed to execute systemctl. Is systemd available?")
}

fn systemctl_checked(args: &[&str]) -> Result<()> {
    let out = systemctl(args)?;
    if !out.status.success() {
        let stderr = String::from_utf8_lossy(&out.stderr);
        anyhow::bail!("systemctl --user {} failed: {}", args.join(" "), stderr.trim());
    }
    Ok(())
}

fn install(config_path: &Path, output: Output) -> Result<()> {
    let config = load_config(config_path)?;
    let exe = std::env::current_exe().context("Cannot locate the drivemirrord binary")?;
    let config_path = if config_path.is_absolute() {
        config_path.to_path_buf()
    } else {
        std::env::current_dir()
            .context("Cannot resolve the working directory")?
            .join(config_path)
    };
    let unit = unit_path()?;

    if let Some(parent) = unit.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(
        &unit,
        render_unit(&exe, &config_path, config.service.shutdown_timeout_secs),
    )
    .with_context(|| format!("Failed to write {}", unit.display()))?;

    systemctl_checked(&["daemon-reload"])?;
    systemctl_checked(&["enable", SYSTEMD_UNIT])?;

    output.success(&format!("Installed {}", unit.display()));
    output.detail("Start it now with: drivemirrord service start");
    output.document(&serde_json::json!({
        "action": "install",
        "unit": unit.display().to_string(),
        "success": true,
    }));
    Ok(())
}

fn uninstall(output: Output) -> Result<()> {
    let unit = unit_path()?;
    if unit.exists() {
        // Fails harmlessly when the unit is not loaded
        let _ = systemctl(&["disable", "--now", SYSTEMD_UNIT])?;
        std::fs::remove_file(&unit)
            .with_context(|| format!("Failed to remove {}", unit.display()))?;
        systemctl_checked(&["daemon-reload"])?;
        output.success(&format!("Removed {}", unit.display()));
    } else {
        output.success("Service is not installed");
    }
    output.document(&serde_json::json!({
        "action": "uninstall",
        "unit": unit.display().to_string(),
        "success": true,
    }));
    Ok(())
}

fn simple_action(action: &str, done: &str, output: Output) -> Result<()> {
    systemctl_checked(&[action, SYSTEMD_UNIT])?;
    output.success(done);
    output.document(&serde_json::json!({ "action": action, "success": true }));
    Ok(())
}

/// Collapses `systemctl is-active` output into a short state
fn parse_active_state(stdout: &str) -> &'static str {
    match stdout.trim() {
        "active" | "reloading" => "running",
        "activating" => "starting",
        "deactivating" => "stopping",
        "failed" => "failed",
        "inactive" => "stopped",
        _ => "unknown",
    }
}

fn status(output: Output) -> Result<()> {
    // `is-active` exits non-zero for anything but active; its stdout is
    // still the state.
    let out = systemctl(&["is-active", SYSTEMD_UNIT])?;
    let state = parse_active_state(&String::from_utf8_lossy(&out.stdout));
    let installed = unit_path()?.exists();

    match state {
        "running" => output.success("Service is running"),
        "failed" => output.failure("Service has failed; see `journalctl --user -u drivemirror`"),
        other => output.detail(&format!("Service is {other}")),
    }
    if !installed {
        output.detail("Unit file is not installed; run `drivemirrord service install`");
    }
    output.document(&serde_json::json!({
        "action": "status",
        "status": state,
        "installed": installed,
    }));
    Ok(())
}
