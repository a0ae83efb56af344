//! DriveRemoteStore - IRemoteStore implementation for Google Drive
//!
//! Wraps the [`DriveClient`] and delegates to the client and upload
//! modules to fulfil the [`IRemoteStore`] port contract.
//!
//! ## Design Notes
//!
//! - The client is shared without a lock: the token source synchronises
//!   itself, and everything else is immutable per call.
//! - Credential failures are surfaced as [`RemoteAuthError`] so the engine
//!   can tell them apart without knowing about [`DriveError`].
//! - Entries whose id or name cannot be represented as a domain newtype are
//!   skipped with a warning instead of failing the whole listing.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use drivemirror_core::domain::{FileName, RemoteFile, RemoteId};
use drivemirror_core::ports::{IRemoteStore, RemoteAuthError};

use crate::client::{DriveClient, DriveFile};
use crate::upload::{self, UploadTarget};
use crate::DriveError;

/// Remote store backed by a Google Drive folder
pub struct DriveRemoteStore {
    client: DriveClient,
}

impl DriveRemoteStore {
    pub fn new(client: DriveClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &DriveClient {
        &self.client
    }
}

/// Converts Drive file resources into domain entries, dropping the ones the
/// domain cannot name
fn to_remote_files(files: Vec<DriveFile>) -> Vec<RemoteFile> {
    files
        .into_iter()
        .filter_map(|file| {
            let id = match RemoteId::new(file.id.clone()) {
                Ok(id) => id,
                Err(e) => {
                    warn!(id = %file.id, error = %e, "Skipping remote entry with unusable id");
                    return None;
                }
            };
            match FileName::new(file.name.clone()) {
                Ok(name) => Some(RemoteFile::new(id, name)),
                Err(e) => {
                    warn!(id = %file.id, name = %file.name, error = %e, "Skipping remote entry with unusable name");
                    None
                }
            }
        })
        .collect()
}

/// Moves credential failures into the port's marker error
fn into_port_error(err: DriveError) -> anyhow::Error {
    match err {
        DriveError::Unauthorized(message) | DriveError::Token(message) => {
            anyhow::Error::new(RemoteAuthError(message))
        }
        other => anyhow::Error::new(other),
    }
}

#[async_trait::async_trait]
impl IRemoteStore for DriveRemoteStore {
    async fn list(&self, folder_id: &RemoteId) -> Result<Vec<RemoteFile>> {
        debug!(folder = %folder_id, "DriveRemoteStore::list");
        let files = self
            .client
            .list_folder(folder_id)
            .await
            .map_err(into_port_error)
            .with_context(|| format!("Failed to list remote folder {folder_id}"))?;
        Ok(to_remote_files(files))
    }

    async fn find_by_name(&self, folder_id: &RemoteId, name: &FileName) -> Result<Vec<RemoteFile>> {
        debug!(folder = %folder_id, name = %name, "DriveRemoteStore::find_by_name");
        let files = self
            .client
            .find_by_name(folder_id, name)
            .await
            .map_err(into_port_error)
            .with_context(|| format!("Failed to look up `{name}` in {folder_id}"))?;
        Ok(to_remote_files(files))
    }

    async fn upload(&self, folder_id: &RemoteId, name: &FileName, local_path: &Path) -> Result<RemoteId> {
        debug!(folder = %folder_id, name = %name, "DriveRemoteStore::upload");
        let file = upload::upload_file(
            &self.client,
            UploadTarget::Create { folder_id, name },
            local_path,
        )
        .await
        .map_err(into_port_error)
        .with_context(|| format!("Failed to upload {}", local_path.display()))?;
        RemoteId::new(file.id).context("Drive returned an unusable file id")
    }

    async fn update(&self, id: &RemoteId, local_path: &Path) -> Result<RemoteId> {
        debug!(id = %id, "DriveRemoteStore::update");
        let file = upload::upload_file(&self.client, UploadTarget::Update { id }, local_path)
            .await
            .map_err(into_port_error)
            .with_context(|| format!("Failed to update {id} from {}", local_path.display()))?;
        RemoteId::new(file.id).context("Drive returned an unusable file id")
    }

    async fn download(&self, id: &RemoteId, dest: &Path) -> Result<u64> {
        debug!(id = %id, "DriveRemoteStore::download");
        self.client
            .download(id, dest)
            .await
            .map_err(into_port_error)
            .with_context(|| format!("Failed to download {id} to {}", dest.display()))
    }

    async fn delete(&self, id: &RemoteId) -> Result<()> {
        debug!(id = %id, "DriveRemoteStore::delete");
        self.client
            .delete(id)
            .await
            .map_err(into_port_error)
            .with_context(|| format!("Failed to delete {id}"))
    }
}

// ============================================================================
// Tests
// ============================================================================
