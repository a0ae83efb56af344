//! Domain entities
//!
//! This module contains the core domain types for drivemirror:
//! - Newtypes for the remote identifier and the file-name identity key
//! - Folder snapshot types, the folder pair and the exclusion set
//! - Domain-specific error types

pub mod errors;
pub mod folder;
pub mod newtypes;

// Re-export commonly used types
pub use errors::DomainError;
pub use folder::{ExclusionSet, LocalFile, RemoteFile, SyncFolderPair};
pub use newtypes::*;
