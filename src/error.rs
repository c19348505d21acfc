//! Error surface for caller misuse of the public API.
//!
//! Control-flow outcomes (deferred, skipped, contended, ...) are values of
//! [`crate::driver::CompactResult`], not errors; this type is reserved for
//! requests the core cannot even attempt to service.

use core::fmt;

/// Errors returned by the public entry points in this crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompactionError {
    /// The requested order is `>= max_order` for the target zone.
    InvalidOrder { requested: u32, max_order: u32 },
    /// No zone is registered under the given index.
    UnknownZone(usize),
    /// No node is registered under the given id.
    UnknownNode(u32),
    /// `kcompactd_run` was called for a node that already has a daemon.
    DaemonAlreadyRunning(u32),
    /// `kcompactd_stop` was called for a node with no running daemon.
    DaemonNotRunning(u32),
}

impl fmt::Display for CompactionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompactionError::InvalidOrder { requested, max_order } => write!(
                f,
                "compaction order {requested} is out of range (max_order = {max_order})"
            ),
            CompactionError::UnknownZone(idx) => write!(f, "unknown zone index {idx}"),
            CompactionError::UnknownNode(id) => write!(f, "unknown node id {id}"),
            CompactionError::DaemonAlreadyRunning(id) => {
                write!(f, "kcompactd already running on node {id}")
            }
            CompactionError::DaemonNotRunning(id) => {
                write!(f, "kcompactd is not running on node {id}")
            }
        }
    }
}

/// Convenience alias for this crate's fallible public functions.
pub type Result<T> = core::result::Result<T, CompactionError>;
