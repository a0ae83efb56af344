//! `run` and `sync-once`
//!
//! Both build the same adapter stack from the config: saved credentials,
//! the Drive client, the procfs process table and one [`SyncContext`].
//! Credentials that cannot be loaded or refreshed abort startup.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use drivemirror_core::config::{expand_tilde, Config};
use drivemirror_gdrive::auth::DriveAuthAdapter;
use drivemirror_gdrive::client::DriveClient;
use drivemirror_gdrive::provider::DriveRemoteStore;
use drivemirror_gdrive::retry::RetryPolicy;
use drivemirror_gdrive::token::{FileTokenStorage, RefreshingTokenSource};
use drivemirror_sync::busy::ProcfsProcessTable;
use drivemirror_sync::context::SyncContext;
use drivemirror_sync::reconcile::ReconciliationEngine;
use drivemirror_sync::service::SyncService;
use tracing::{info, warn};

use super::{ensure_valid, load_config};
use crate::output::Output;

/// Runs both control paths until SIGINT or SIGTERM
pub async fn run(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    ensure_valid(&config, config_path)?;
    let ctx = build_context(&config).await?;

    let running = SyncService::from_config(ctx, &config.sync)
        .start()
        .context("Failed to start sync service")?;

    shutdown_signal().await?;

    let timeout = Duration::from_secs(config.service.shutdown_timeout_secs);
    if !running.stop(timeout).await {
        warn!("Shutdown deadline passed, in-flight work was abandoned");
    }
    info!("drivemirror stopped");
    Ok(())
}

/// Runs a single reconciliation cycle and prints what it did
pub async fn sync_once(config_path: &Path, output: Output) -> Result<()> {
    let config = load_config(config_path)?;
    ensure_valid(&config, config_path)?;
    let engine = ReconciliationEngine::new(build_context(&config).await?);

    let report = engine.reconcile().await.context("Reconciliation failed")?;

    output.success(&format!("Reconciled: {report}"));
    for name in &report.downloaded {
        output.detail(&format!("downloaded {name}"));
    }
    for name in &report.deleted {
        output.detail(&format!("deleted locally {name}"));
    }
    for name in &report.skipped_busy {
        output.detail(&format!("in use, kept {name}"));
    }
    for (name, error) in &report.failures {
        output.detail(&format!("failed {name}: {error}"));
    }
    output.document(&serde_json::json!({
        "downloaded": report.downloaded.iter().map(|n| n.as_str()).collect::<Vec<_>>(),
        "deleted": report.deleted.iter().map(|n| n.as_str()).collect::<Vec<_>>(),
        "busy": report.skipped_busy.iter().map(|n| n.as_str()).collect::<Vec<_>>(),
        "deferred": report.deferred.iter().map(|n| n.as_str()).collect::<Vec<_>>(),
        "failures": report
            .failures
            .iter()
            .map(|(n, e)| serde_json::json!({ "name": n.as_str(), "error": e }))
            .collect::<Vec<_>>(),
    }));
    Ok(())
}

async fn build_context(config: &Config) -> Result<Arc<SyncContext>> {
    let pair = config.folder_pair()?;
    anyhow::ensure!(
        pair.local_root().is_dir(),
        "Sync root {} does not exist",
        pair.local_root().display()
    );

    let secrets = expand_tilde(&config.auth.client_secrets);
    let auth = DriveAuthAdapter::from_client_secrets_file(&secrets)?;
    let storage = FileTokenStorage::new(expand_tilde(&config.auth.token_file));
    let tokens = RefreshingTokenSource::load(auth.refresh_flow()?, storage)
        .await
        .context("Authentication failed; run `drivemirrord auth login`")?;

    let chunk_size = usize::try_from(config.transfer.chunk_size_kib.saturating_mul(1024))
        .context("transfer.chunk_size_kib is too large")?;
    let client = DriveClient::new(Arc::new(tokens))?
        .with_retry_policy(RetryPolicy::with_max_retries(config.transfer.num_retries))
        .with_chunk_size(chunk_size);

    let ctx = SyncContext::from_config(
        config,
        Arc::new(DriveRemoteStore::new(client)),
        Arc::new(ProcfsProcessTable::default()),
    )?;
    info!(
        root = %ctx.pair().local_root().display(),
        folder = %ctx.pair().remote_folder_id(),
        exclusions = ?ctx.exclusions().sorted(),
        "Sync context ready"
    );
    Ok(Arc::new(ctx))
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate =
            signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                res.context("Failed to install Ctrl+C handler")?;
                info!("Received SIGINT (Ctrl+C)");
            }
            _ = terminate.recv() => info!("Received SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .context("Failed to install Ctrl+C handler")?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
