//! drivemirror core - domain types, configuration and ports
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain types** - `RemoteId`, `FileName`, `RemoteFile`, `LocalFile`,
//!   `SyncFolderPair`, `ExclusionSet`
//! - **Port definitions** - Traits for adapters: `IRemoteStore`, `IProcessTable`
//! - **Configuration** - the YAML config file, defaults and validation
//!
//! # Architecture
//!
//! The domain module contains pure types with no I/O. Ports define trait
//! interfaces that adapter crates implement. The sync engine in
//! `drivemirror-sync` drives the ports.

pub mod config;
pub mod domain;
pub mod ports;
