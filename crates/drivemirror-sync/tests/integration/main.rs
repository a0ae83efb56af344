//! Integration tests for drivemirror-sync
//!
//! Runs the reconciliation engine, the change dispatcher and the service
//! against an in-memory remote store and a scripted process table, with a
//! real temporary directory as the local root.

mod common;

mod test_reconcile;
mod test_service;
