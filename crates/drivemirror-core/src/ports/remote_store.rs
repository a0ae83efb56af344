//! Remote store port (driven/secondary port)
//!
//! This module defines the folder-scoped interface the sync engine uses to
//! talk to cloud storage. The shipped adapter targets Google Drive, but the
//! engine only depends on this trait, so any object store that can list,
//! look up by name, upload, download and delete fits behind it.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because errors at port boundaries are adapter-specific
//!   and don't need domain-level classification.
//! - Uses `#[async_trait]` for async trait methods.
//! - Transfers are expected to be chunked and retried inside the adapter;
//!   the engine never retries a single call itself.
//! - Implementations must be safe for concurrent independent calls; the
//!   reconciliation loop and the watcher dispatcher share one handle.

use std::path::Path;

use thiserror::Error;

use crate::domain::folder::RemoteFile;
use crate::domain::newtypes::{FileName, RemoteId};

/// Marker error for credentials the remote store rejected
///
/// Adapters return it (inside `anyhow::Error`) when a call failed because
/// authentication is no longer possible without the user. Callers detect it
/// with `err.downcast_ref::<RemoteAuthError>()`.
#[derive(Debug, Clone, Error)]
#[error("Remote store rejected the credentials: {0}")]
pub struct RemoteAuthError(pub String);

/// Port trait for folder-scoped remote storage operations
///
/// Every operation addresses entries either by their opaque [`RemoteId`] or
/// by `(folder, name)`. Names are not guaranteed unique remotely; listing and
/// lookup return every match and callers pick the first.
#[async_trait::async_trait]
pub trait IRemoteStore: Send + Sync {
    /// Lists the non-trashed files directly inside `folder_id`
    ///
    /// Sub-folders are not returned.
    async fn list(&self, folder_id: &RemoteId) -> anyhow::Result<Vec<RemoteFile>>;

    /// Finds files inside `folder_id` whose name equals `name` exactly
    async fn find_by_name(
        &self,
        folder_id: &RemoteId,
        name: &FileName,
    ) -> anyhow::Result<Vec<RemoteFile>>;

    /// Creates a new remote entry named `name` in `folder_id` with the
    /// content of `local_path`
    ///
    /// Never replaces an existing entry, so calling this twice for the same
    /// name produces two remote files.
    ///
    /// # Returns
    /// The identifier of the created entry
    async fn upload(
        &self,
        folder_id: &RemoteId,
        name: &FileName,
        local_path: &Path,
    ) -> anyhow::Result<RemoteId>;

    /// Replaces the content of the existing entry `id` with `local_path`
    async fn update(&self, id: &RemoteId, local_path: &Path) -> anyhow::Result<RemoteId>;

    /// Downloads the content of `id` into `dest`, overwriting it
    ///
    /// # Returns
    /// Number of bytes written
    async fn download(&self, id: &RemoteId, dest: &Path) -> anyhow::Result<u64>;

    /// Deletes the remote entry `id`
    async fn delete(&self, id: &RemoteId) -> anyhow::Result<()>;
}
