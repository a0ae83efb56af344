//! `auth login|status|logout`
//!
//! Credentials live in the token file named by `auth.token_file`; the
//! OAuth client comes from the Google `credentials.json` at
//! `auth.client_secrets`.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Subcommand;
use drivemirror_core::config::expand_tilde;
use drivemirror_gdrive::auth::DriveAuthAdapter;
use drivemirror_gdrive::token::FileTokenStorage;
use tracing::info;

use super::load_config;
use crate::output::Output;

#[derive(Debug, Subcommand)]
pub enum AuthCommand {
    /// Authorize access to Google Drive in the browser
    Login,
    /// Show whether credentials are stored and when they expire
    Status,
    /// Delete the stored credentials
    Logout,
}

impl AuthCommand {
    pub async fn execute(&self, config_path: &Path, output: Output) -> Result<()> {
        let config = load_config(config_path)?;
        let storage = FileTokenStorage::new(expand_tilde(&config.auth.token_file));
        match self {
            AuthCommand::Login => {
                let secrets = expand_tilde(&config.auth.client_secrets);
                login(&secrets, &storage, output).await
            }
            AuthCommand::Status => status(&storage, output),
            AuthCommand::Logout => logout(&storage, output),
        }
    }
}

async fn login(secrets: &Path, storage: &FileTokenStorage, output: Output) -> Result<()> {
    let adapter = DriveAuthAdapter::from_client_secrets_file(secrets)?;
    output.detail("Complete the authorization in your browser.");

    let tokens = adapter.login().await.context("Login failed")?;
    storage.store(&tokens)?;
    info!(path = %storage.path().display(), "Credentials saved");

    output.success(&format!("Logged in; credentials saved to {}", storage.path().display()));
    output.document(&serde_json::json!({
        "logged_in": true,
        "token_file": storage.path().display().to_string(),
        "has_refresh_token": tokens.refresh_token.is_some(),
    }));
    Ok(())
}

fn status(storage: &FileTokenStorage, output: Output) -> Result<()> {
    let Some(tokens) = storage.load()? else {
        output.failure("Not logged in; run `drivemirrord auth login`");
        output.document(&serde_json::json!({
            "logged_in": false,
            "token_file": storage.path().display().to_string(),
        }));
        return Ok(());
    };

    let refreshable = tokens.refresh_token.is_some();
    if tokens.is_expired() && !refreshable {
        output.failure("Access token expired and cannot be refreshed; log in again");
    } else {
        output.success("Logged in");
    }
    output.detail(&format!("Token file: {}", storage.path().display()));
    output.detail(&format!(
        "Access token expires: {} ({})",
        tokens.expires_at.to_rfc3339(),
        if tokens.is_expired() { "expired" } else { "valid" }
    ));
    output.detail(&format!(
        "Refresh token: {}",
        if refreshable { "present" } else { "missing" }
    ));
    output.document(&serde_json::json!({
        "logged_in": true,
        "token_file": storage.path().display().to_string(),
        "expires_at": tokens.expires_at.to_rfc3339(),
        "expires_in_secs": (tokens.expires_at - Utc::now()).num_seconds(),
        "has_refresh_token": refreshable,
    }));
    Ok(())
}

fn logout(storage: &FileTokenStorage, output: Output) -> Result<()> {
    storage.clear()?;
    output.success("Logged out");
    output.document(&serde_json::json!({ "logged_in": false }));
    Ok(())
}
