//! Engine error taxonomy.
//!
//! Every filesystem call ends in either a payload or one of these. The
//! transport translates them to its native failure representation through
//! the `From<NfError> for io::Error` impl below.

use std::io;
use thiserror::Error;

use crate::backend::BackendError;

/// Engine error type.
#[derive(Debug, Error)]
pub enum NfError {
    /// Path does not resolve, or names something that does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Write payload could not be decoded for the attribute's declared kind.
    #[error("invalid value: {0}")]
    ValidationError(String),

    /// Operation is never allowed at this address (read-only attribute,
    /// user-created files, renames).
    #[error("not permitted: {0}")]
    NotPermitted(String),

    /// Operation shape is not supported (partial-offset writes, non-zero truncate).
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Channel endpoint is not a running instance.
    #[error("invalid channel endpoint: {0}")]
    InvalidEndpoint(String),

    /// Concurrent mutation collision that could not be resolved idempotently.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Expected a directory.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// Expected a file.
    #[error("is a directory: {0}")]
    IsADirectory(String),

    #[error("backend unreachable: {0}")]
    BackendUnreachable(String),

    #[error("backend rejected request: {0}")]
    BackendRejected(String),

    #[error("backend timed out")]
    BackendTimeout,
}

impl NfError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }

    pub fn not_permitted(what: impl Into<String>) -> Self {
        Self::NotPermitted(what.into())
    }

    pub fn not_supported(what: impl Into<String>) -> Self {
        Self::NotSupported(what.into())
    }

    pub fn invalid_endpoint(what: impl Into<String>) -> Self {
        Self::InvalidEndpoint(what.into())
    }

    pub fn not_a_directory(path: impl Into<String>) -> Self {
        Self::NotADirectory(path.into())
    }

    pub fn is_a_directory(path: impl Into<String>) -> Self {
        Self::IsADirectory(path.into())
    }

    /// True for failures that originate in the orchestration backend.
    pub fn is_backend(&self) -> bool {
        matches!(
            self,
            NfError::BackendUnreachable(_)
                | NfError::BackendRejected(_)
                | NfError::BackendTimeout
                | NfError::Conflict(_)
        )
    }
}

impl From<BackendError> for NfError {
    fn from(e: BackendError) -> Self {
        match e {
            BackendError::Unreachable(msg) => NfError::BackendUnreachable(msg),
            BackendError::Rejected(reason) => NfError::BackendRejected(reason),
            BackendError::Timeout => NfError::BackendTimeout,
            BackendError::Conflict(msg) => NfError::Conflict(msg),
        }
    }
}

/// Convert NfError to std::io::Error for the filesystem transport.
impl From<NfError> for io::Error {
    fn from(e: NfError) -> Self {
        match e {
            NfError::NotFound(msg) => io::Error::new(io::ErrorKind::NotFound, msg),
            NfError::ValidationError(msg) => io::Error::new(io::ErrorKind::InvalidInput, msg),
            NfError::NotPermitted(msg) => io::Error::new(io::ErrorKind::PermissionDenied, msg),
            NfError::NotSupported(msg) => io::Error::new(io::ErrorKind::Unsupported, msg),
            NfError::InvalidEndpoint(msg) => io::Error::new(io::ErrorKind::InvalidInput, msg),
            NfError::Conflict(msg) => io::Error::new(io::ErrorKind::ResourceBusy, msg),
            NfError::NotADirectory(msg) => io::Error::new(io::ErrorKind::NotADirectory, msg),
            NfError::IsADirectory(msg) => io::Error::new(io::ErrorKind::IsADirectory, msg),
            NfError::BackendUnreachable(msg) => {
                io::Error::new(io::ErrorKind::NotConnected, msg)
            }
            NfError::BackendRejected(msg) => io::Error::other(msg),
            NfError::BackendTimeout => {
                io::Error::new(io::ErrorKind::TimedOut, "backend timed out")
            }
        }
    }
}

/// Engine result type.
pub type NfResult<T> = Result<T, NfError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_mapping() {
        assert!(matches!(
            NfError::from(BackendError::Rejected("no capacity".into())),
            NfError::BackendRejected(r) if r == "no capacity"
        ));
        assert!(matches!(NfError::from(BackendError::Timeout), NfError::BackendTimeout));
        assert!(NfError::BackendTimeout.is_backend());
        assert!(!NfError::not_found("x").is_backend());
    }

    #[test]
    fn test_io_error_kinds() {
        let e: io::Error = NfError::not_supported("offset 3").into();
        assert_eq!(e.kind(), io::ErrorKind::Unsupported);
        let e: io::Error = NfError::not_permitted("status is read-only").into();
        assert_eq!(e.kind(), io::ErrorKind::PermissionDenied);
        let e: io::Error = NfError::BackendTimeout.into();
        assert_eq!(e.kind(), io::ErrorKind::TimedOut);
    }
}
