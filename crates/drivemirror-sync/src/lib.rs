//! drivemirror Sync - Reconciliation engine and local change watcher
//!
//! Provides:
//! - Periodic full-listing reconciliation of a local directory against a
//!   remote folder
//! - Event-driven upload and delete of single files from filesystem
//!   notifications
//! - Per-name coordination between both control paths
//! - Busy-file detection before local deletes
//!
//! ## Modules
//!
//! - [`context`] - Shared [`SyncContext`](context::SyncContext) for both control paths
//! - [`coordination`] - Per-name locks and recent-activity tracking
//! - [`busy`] - Open-handle scan over the process table
//! - [`reconcile`] - One reconciliation cycle
//! - [`watcher`] - `notify` wrapper producing [`ChangeEvent`](watcher::ChangeEvent)s
//! - [`dispatcher`] - One remote operation per change event
//! - [`scheduler`] - Fixed-interval reconciliation loop
//! - [`service`] - Starts and stops both control paths

pub mod busy;
pub mod context;
pub mod coordination;
pub mod dispatcher;
pub mod reconcile;
pub mod scheduler;
pub mod service;
pub mod watcher;

use std::path::PathBuf;

use drivemirror_core::ports::RemoteAuthError;
use thiserror::Error;

/// Errors that can occur during synchronization operations
#[derive(Debug, Error)]
pub enum SyncError {
    /// The remote store rejected the stored credentials
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Listing the remote folder failed; the cycle is skipped
    #[error("Remote listing failed: {0}")]
    RemoteList(String),

    /// A single upload, download or delete failed
    #[error("Remote transfer failed for {name}: {message}")]
    RemoteTransfer {
        /// File name the operation was for
        name: String,
        /// Error chain from the remote store
        message: String,
    },

    /// A local filesystem operation failed
    #[error("Local I/O error at {path}: {source}")]
    LocalIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A file is currently open in another process
    #[error("File is in use: {0}")]
    FileBusy(PathBuf),

    /// A delete event found no remote file with that name
    #[error("No remote file named {0}")]
    LookupMiss(String),

    /// The filesystem watcher could not be set up
    #[error("Watcher error: {0}")]
    Watch(String),

    /// A domain-level error propagated from drivemirror-core
    #[error("Domain error: {0}")]
    DomainError(#[from] drivemirror_core::domain::DomainError),
}

impl SyncError {
    /// Classifies a remote listing failure
    pub(crate) fn remote_list(err: anyhow::Error) -> Self {
        match err.downcast_ref::<RemoteAuthError>() {
            Some(auth) => Self::Auth(auth.0.clone()),
            None => Self::RemoteList(format!("{err:#}")),
        }
    }

    /// Classifies a failed single-file remote operation
    pub(crate) fn remote_transfer(name: &str, err: anyhow::Error) -> Self {
        match err.downcast_ref::<RemoteAuthError>() {
            Some(auth) => Self::Auth(auth.0.clone()),
            None => Self::RemoteTransfer {
                name: name.to_string(),
                message: format!("{err:#}"),
            },
        }
    }

    pub(crate) fn local_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::LocalIo {
            path: path.into(),
            source,
        }
    }

    /// Returns true for failures that need the user to log in again
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }
}
