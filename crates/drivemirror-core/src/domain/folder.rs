//! Folder-level domain types
//!
//! The snapshot types the engine diffs ([`RemoteFile`], [`LocalFile`]), the
//! fixed local/remote mapping ([`SyncFolderPair`]) and the set of names that
//! reconciliation must never delete locally ([`ExclusionSet`]).

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::{FileName, RemoteId};

/// A file as observed in a remote folder listing
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteFile {
    pub id: RemoteId,
    pub name: FileName,
}

impl RemoteFile {
    #[must_use]
    pub fn new(id: RemoteId, name: FileName) -> Self {
        Self { id, name }
    }
}

/// A file as observed in the local directory or in a watcher event
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocalFile {
    pub path: PathBuf,
    pub name: FileName,
}

impl LocalFile {
    /// Build from a path, taking the base name as the identity key
    ///
    /// # Errors
    /// Returns error if the path has no usable final component
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self, DomainError> {
        let path = path.into();
        let name = FileName::from_path(&path)?;
        Ok(Self { path, name })
    }
}

/// The one-to-one mapping between a local directory and a remote folder
///
/// Immutable once constructed; the engine holds it for the whole process
/// lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncFolderPair {
    local_root: PathBuf,
    remote_folder_id: RemoteId,
}

impl SyncFolderPair {
    /// Create a new folder pair
    ///
    /// # Errors
    /// Returns error if `local_root` is not absolute
    pub fn new(local_root: PathBuf, remote_folder_id: RemoteId) -> Result<Self, DomainError> {
        if !local_root.is_absolute() {
            return Err(DomainError::InvalidPath(format!(
                "Local root must be absolute: {}",
                local_root.display()
            )));
        }
        Ok(Self {
            local_root,
            remote_folder_id,
        })
    }

    #[must_use]
    pub fn local_root(&self) -> &Path {
        &self.local_root
    }

    #[must_use]
    pub fn remote_folder_id(&self) -> &RemoteId {
        &self.remote_folder_id
    }

    /// Local path for a top-level name inside the root
    #[must_use]
    pub fn local_path(&self, name: &FileName) -> PathBuf {
        self.local_root.join(name.as_str())
    }
}

/// Literal file names that reconciliation never deletes locally
///
/// Only the local-deletion path consults this set. Matching is exact and
/// case-sensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionSet {
    names: HashSet<String>,
}

impl ExclusionSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a literal name
    pub fn insert(&mut self, name: impl Into<String>) {
        self.names.insert(name.into());
    }

    /// Add the base name of `path`, if it has one
    ///
    /// Used to protect the program's own files (token, client secrets,
    /// log) when they live inside the synced directory.
    pub fn insert_file_of(&mut self, path: &Path) {
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            self.names.insert(name.to_string());
        }
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Names in sorted order, for logging and display
    #[must_use]
    pub fn sorted(&self) -> Vec<&str> {
        self.names
            .iter()
            .map(String::as_str)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

impl<S: Into<String>> FromIterator<S> for ExclusionSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            names: iter.into_iter().map(Into::into).collect(),
        }
    }
}
