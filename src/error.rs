//! Error taxonomy for the library store.
//!
//! Store operations return typed errors so callers can distinguish a
//! missing entry from a damaged one. Failures on a single entry are never
//! widened to the whole library: the listing path skips and logs, every
//! other path surfaces the error to the caller.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::library::EntryId;

/// Result alias used throughout the store modules.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors produced by store and import operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The referenced entry has no metadata record.
    #[error("entry not found: {id}")]
    EntryNotFound { id: EntryId },

    /// The remote fetch during import did not terminate in a 200 response.
    #[error("failed to fetch '{url}': {reason}")]
    FetchFailed { url: String, reason: String },

    /// A persisted record exists but does not parse.
    ///
    /// Recoverable at the granularity of one entry: the aggregate listing
    /// skips it, direct reads and updates of the entry fail with this.
    #[error("corrupt record for entry {id} at '{path}': {source}")]
    CorruptState {
        id: EntryId,
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A request payload was malformed; rejected before any mutation.
    #[error("invalid payload: {reason}")]
    Validation { reason: String },

    /// An underlying filesystem operation failed.
    #[error("storage operation failed at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StoreError {
    /// Wrap an I/O error with the path it occurred on.
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
