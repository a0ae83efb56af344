//! Local change dispatcher
//!
//! Consumes [`ChangeEvent`]s one at a time and performs exactly one remote
//! operation per event:
//!
//! - `Created` / `Modified` of a file → upload, named by the file's base name
//! - `Deleted` of a file → delete the first remote file with that name
//!
//! Directory events, partial downloads and echoes of the engine's own
//! writes are ignored. An echo is an event for a file that still has the
//! size and mtime the engine left, or a delete of a file the engine
//! removed. Nested files are uploaded flat into the remote folder.

use std::sync::Arc;

use drivemirror_core::config::UploadStrategy;
use drivemirror_core::domain::{FileName, RemoteId};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::context::SyncContext;
use crate::reconcile::is_partial_name;
use crate::watcher::{ChangeEvent, ChangeKind};
use crate::SyncError;

/// What handling one event did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A new remote file was created
    Created(RemoteId),
    /// An existing remote file received new content
    Updated(RemoteId),
    /// A remote file was deleted
    Deleted(RemoteId),
    /// Nothing to do for this event
    Ignored(IgnoreReason),
}

/// Why an event caused no remote call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    Directory,
    UnusableName,
    PartialDownload,
    Echo,
    Vanished,
}

/// Maps local changes onto remote operations
pub struct LocalChangeDispatcher {
    ctx: Arc<SyncContext>,
}

impl LocalChangeDispatcher {
    pub fn new(ctx: Arc<SyncContext>) -> Self {
        Self { ctx }
    }

    /// Processes events until the channel closes or `cancel` fires
    ///
    /// Cancellation is only observed between events; an upload in progress
    /// runs to completion.
    pub async fn run(self, mut rx: mpsc::Receiver<ChangeEvent>, cancel: CancellationToken) {
        info!("Change dispatcher started");
        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                event = rx.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            match self.handle(&event).await {
                Ok(DispatchOutcome::Ignored(reason)) => {
                    debug!(path = %event.path.display(), ?reason, "Event ignored");
                }
                Ok(outcome) => debug!(path = %event.path.display(), ?outcome, "Event handled"),
                Err(e @ SyncError::LookupMiss(_)) => warn!(error = %e, "Nothing to delete remotely"),
                Err(e) if e.is_auth() => error!(error = %e, "Remote store rejected credentials"),
                Err(e) => warn!(path = %event.path.display(), error = %e, "Failed to handle change"),
            }
        }
        info!("Change dispatcher stopped");
    }

    /// Handles a single event
    ///
    /// # Errors
    /// - [`SyncError::LookupMiss`] if a deleted file has no remote counterpart
    /// - [`SyncError::RemoteTransfer`] / [`SyncError::Auth`] if the remote
    ///   call fails
    #[tracing::instrument(skip(self), fields(kind = ?event.kind, path = %event.path.display()))]
    pub async fn handle(&self, event: &ChangeEvent) -> Result<DispatchOutcome, SyncError> {
        if event.is_directory {
            return Ok(DispatchOutcome::Ignored(IgnoreReason::Directory));
        }
        let Ok(name) = FileName::from_path(&event.path) else {
            return Ok(DispatchOutcome::Ignored(IgnoreReason::UnusableName));
        };
        if is_partial_name(name.as_str()) {
            return Ok(DispatchOutcome::Ignored(IgnoreReason::PartialDownload));
        }

        match event.kind {
            ChangeKind::Created | ChangeKind::Modified => self.push(event, &name).await,
            ChangeKind::Deleted => self.remove(&name).await,
        }
    }

    async fn push(&self, event: &ChangeEvent, name: &FileName) -> Result<DispatchOutcome, SyncError> {
        let _guard = self.ctx.locks().lock(name).await;

        let metadata = match tokio::fs::metadata(&event.path).await {
            Ok(metadata) if metadata.is_dir() => {
                return Ok(DispatchOutcome::Ignored(IgnoreReason::Directory))
            }
            Ok(metadata) => metadata,
            Err(_) => return Ok(DispatchOutcome::Ignored(IgnoreReason::Vanished)),
        };
        let writes = self.ctx.engine_writes();
        if writes.is_own_write(name, &metadata, self.ctx.echo_window()) {
            return Ok(DispatchOutcome::Ignored(IgnoreReason::Echo));
        }

        let store = self.ctx.store();
        let folder = self.ctx.pair().remote_folder_id();
        let transfer_err = |e| SyncError::remote_transfer(name.as_str(), e);

        let outcome = match self.ctx.upload_strategy() {
            UploadStrategy::Upsert => {
                let existing = store
                    .find_by_name(folder, name)
                    .await
                    .map_err(transfer_err)?;
                match existing.first() {
                    Some(remote) => {
                        let id = store
                            .update(&remote.id, &event.path)
                            .await
                            .map_err(transfer_err)?;
                        DispatchOutcome::Updated(id)
                    }
                    None => {
                        let id = store
                            .upload(folder, name, &event.path)
                            .await
                            .map_err(transfer_err)?;
                        DispatchOutcome::Created(id)
                    }
                }
            }
            UploadStrategy::AlwaysCreate => {
                let id = store
                    .upload(folder, name, &event.path)
                    .await
                    .map_err(transfer_err)?;
                DispatchOutcome::Created(id)
            }
        };

        self.ctx.uploads().record(name);
        writes.forget(name);
        info!(name = %name, ?outcome, "Uploaded local change");
        Ok(outcome)
    }

    async fn remove(&self, name: &FileName) -> Result<DispatchOutcome, SyncError> {
        let _guard = self.ctx.locks().lock(name).await;
        if self.ctx.engine_writes().is_own_removal(name, self.ctx.echo_window()) {
            return Ok(DispatchOutcome::Ignored(IgnoreReason::Echo));
        }
        let store = self.ctx.store();

        let matches = store
            .find_by_name(self.ctx.pair().remote_folder_id(), name)
            .await
            .map_err(|e| SyncError::remote_transfer(name.as_str(), e))?;
        let Some(remote) = matches.into_iter().next() else {
            return Err(SyncError::LookupMiss(name.to_string()));
        };

        store
            .delete(&remote.id)
            .await
            .map_err(|e| SyncError::remote_transfer(name.as_str(), e))?;
        info!(name = %name, id = %remote.id, "Deleted remote file");
        Ok(DispatchOutcome::Deleted(remote.id))
    }
}
