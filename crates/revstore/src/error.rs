//! Error types and the last-error slot.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;

/// Coarse classification of a [`StoreError`], convenient for matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgument,
    RepositoryUnavailable,
    DocumentNotFound,
    StorageWriteFailure,
    StorageReadFailure,
}

/// Errors that can occur during store operations
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Repository unavailable at {}: {source}", .path.display())]
    RepositoryUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Document not found at {}: {reason}", .path.display())]
    DocumentNotFound { path: PathBuf, reason: String },

    #[error("Failed to write {}: {source}", .path.display())]
    StorageWriteFailure {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to read {}: {source}", .path.display())]
    StorageReadFailure {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            StoreError::RepositoryUnavailable { .. } => ErrorKind::RepositoryUnavailable,
            StoreError::DocumentNotFound { .. } => ErrorKind::DocumentNotFound,
            StoreError::StorageWriteFailure { .. } => ErrorKind::StorageWriteFailure,
            StoreError::StorageReadFailure { .. } => ErrorKind::StorageReadFailure,
        }
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        StoreError::InvalidArgument(msg.into())
    }

    pub(crate) fn unavailable(path: &Path, source: io::Error) -> Self {
        StoreError::RepositoryUnavailable {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn not_found(path: &Path, reason: impl Into<String>) -> Self {
        StoreError::DocumentNotFound {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    pub(crate) fn write(path: &Path, source: io::Error) -> Self {
        StoreError::StorageWriteFailure {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn read(path: &Path, source: io::Error) -> Self {
        StoreError::StorageReadFailure {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Holds the message of the most recent failed call.
///
/// Every tracked call clears the slot on entry. The `Result` returned by the
/// call is authoritative; the slot only mirrors it for callers that poll.
#[derive(Debug, Default)]
pub struct ErrorReporter {
    last: Mutex<String>,
}

impl ErrorReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Message of the most recent failure, or `""` if the last call succeeded.
    pub fn last_error(&self) -> String {
        self.slot().clone()
    }

    pub fn clear(&self) {
        self.slot().clear();
    }

    pub fn record(&self, err: &StoreError) {
        *self.slot() = err.to_string();
    }

    /// Run `op` with the clear-on-entry / record-on-failure discipline.
    pub fn track<T>(&self, op: impl FnOnce() -> Result<T>) -> Result<T> {
        self.clear();
        let result = op();
        if let Err(err) = &result {
            self.record(err);
        }
        result
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, String> {
        self.last.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let err = StoreError::write(Path::new("/x"), io::Error::other("disk full"));
        assert_eq!(err.kind(), ErrorKind::StorageWriteFailure);
        assert_eq!(
            StoreError::invalid("bad").kind(),
            ErrorKind::InvalidArgument
        );
    }

    #[test]
    fn test_messages_name_the_path() {
        let err = StoreError::read(Path::new("/repo/001/000/a.txt"), io::Error::other("eio"));
        let msg = err.to_string();
        assert!(msg.contains("/repo/001/000/a.txt"));
        assert!(msg.contains("eio"));
    }

    #[test]
    fn test_track_clears_on_success() {
        let reporter = ErrorReporter::new();
        let _ = reporter.track::<()>(|| Err(StoreError::invalid("doc id must be positive")));
        assert!(reporter.last_error().contains("positive"));

        reporter.track(|| Ok(())).unwrap();
        assert_eq!(reporter.last_error(), "");
    }
}
