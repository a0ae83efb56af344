//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. Ports are interfaces that the sync engine
//! depends on, but whose implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IRemoteStore`] - Folder-scoped cloud storage operations (Google Drive)
//! - [`IProcessTable`] - Running processes and their open files

pub mod process_table;
pub mod remote_store;

pub use process_table::{IProcessTable, Pid};
pub use remote_store::{IRemoteStore, RemoteAuthError};
