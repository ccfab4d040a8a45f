//! Error types for linkmeta
//!
//! This module defines the common error type used throughout the system.

use crate::mac::MacParseError;
use std::path::PathBuf;
use thiserror::Error;

/// Common result type for linkmeta operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for linkmeta
#[derive(Debug, Error)]
pub enum Error {
    // Document errors
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported document extension: {}", .path.display())]
    UnsupportedExtension { path: PathBuf },

    #[error("empty document: {}", .path.display())]
    EmptyDocument { path: PathBuf },

    #[error("unknown schema: {0}")]
    UnknownSchema(String),

    #[error("failed to parse {}: {}", .path.display(), .message)]
    Parse { path: PathBuf, message: String },

    // Lookup errors
    #[error("not found")]
    NotFound,

    // Address errors
    #[error("invalid hardware address: {0}")]
    InvalidMac(#[from] MacParseError),

    // Kernel/syscall errors
    #[error("bad netlink message")]
    BadNetlinkMessage,

    #[error("netlink error: {0}")]
    Netlink(String),

    // Filesystem watcher errors
    #[error("watch error: {0}")]
    Watch(String),

    // Control-flow errors
    #[error("operation cancelled")]
    Cancelled,

    #[error("store is closed")]
    Closed,

    // Internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Attach a file path to a decode error message
    pub fn parse(path: impl Into<PathBuf>, msg: impl ToString) -> Self {
        Self::Parse {
            path: path.into(),
            message: msg.to_string(),
        }
    }

    /// Check if this is a not found error
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    /// Check if this is a cancellation
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_not_found() {
        assert!(Error::NotFound.is_not_found());
        assert!(!Error::Cancelled.is_not_found());
    }

    #[test]
    fn test_error_cancelled() {
        assert!(Error::Cancelled.is_cancelled());
        assert!(!Error::NotFound.is_cancelled());
    }

    #[test]
    fn test_parse_error_carries_path() {
        let err = Error::parse("/var/md/vm1.json", "bad payload");
        assert!(err.to_string().contains("/var/md/vm1.json"));
        assert!(err.to_string().contains("bad payload"));
    }
}
