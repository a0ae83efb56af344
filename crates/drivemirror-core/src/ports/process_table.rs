//! Process enumeration port (driven/secondary port)
//!
//! Lists running processes and the files each one currently holds open.
//! The busy-file guard is the only consumer.
//!
//! ## Design Notes
//!
//! - Synchronous: enumeration is a burst of small blocking reads, and
//!   callers run it on a blocking thread.
//! - `open_files` failing for one process (permission denied, process exited
//!   mid-scan) is an ordinary outcome that callers are expected to skip.

use std::path::PathBuf;

/// OS process identifier
pub type Pid = u32;

/// Port trait for process and open-handle enumeration
pub trait IProcessTable: Send + Sync {
    /// Returns the identifiers of all processes visible to the caller
    fn processes(&self) -> anyhow::Result<Vec<Pid>>;

    /// Returns the paths of the regular files `pid` currently has open
    fn open_files(&self, pid: Pid) -> anyhow::Result<Vec<PathBuf>>;
}
