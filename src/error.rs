//! Error types for RawExport
//!
//! This module defines all error types used throughout the crate,
//! providing detailed error information for debugging and user feedback.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for export operations
#[derive(Error, Debug)]
pub enum ExportError {
    /// I/O error during file operations
    #[error("I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Source file not found
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// Permission denied
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// Source is not a regular file
    #[error("Unsupported file type at '{path}': {file_type}")]
    UnsupportedFileType { path: PathBuf, file_type: String },

    /// A syscall on the transfer path failed
    #[error("{op} failed: {source}")]
    Syscall {
        op: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// Compression/decompression error
    #[error("Compression error: {0}")]
    CompressionError(String),

    /// Unknown compression kind supplied at the API boundary
    #[error("Unknown compression kind: {0}")]
    UnknownCompression(String),
}

impl ExportError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a syscall error naming the failing operation
    pub fn syscall(op: &'static str, source: std::io::Error) -> Self {
        Self::Syscall { op, source }
    }

    /// Create an open error, mapping the common kinds to dedicated variants
    pub fn open(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(path),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(path),
            _ => Self::Io { path, source },
        }
    }

    /// Check if this error is a permission issue
    pub fn is_permission_error(&self) -> bool {
        match self {
            Self::PermissionDenied(_) => true,
            Self::Io { source, .. } | Self::Syscall { source, .. } => {
                source.kind() == std::io::ErrorKind::PermissionDenied
            }
            _ => false,
        }
    }

    /// Get the path associated with this error, if any
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            Self::Io { path, .. }
            | Self::NotFound(path)
            | Self::PermissionDenied(path)
            | Self::UnsupportedFileType { path, .. } => Some(path),
            _ => None,
        }
    }
}

/// Result type alias for export operations
pub type Result<T> = std::result::Result<T, ExportError>;

impl From<std::io::Error> for ExportError {
    fn from(err: std::io::Error) -> Self {
        ExportError::Io {
            path: PathBuf::new(),
            source: err,
        }
    }
}

/// Extension trait for adding path context to std::io::Result
pub trait IoResultExt<T> {
    /// Add path context to an I/O error
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| ExportError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_with_path() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = ExportError::io("/test/path", io_err);
        assert_eq!(err.path().unwrap(), &PathBuf::from("/test/path"));
    }

    #[test]
    fn test_open_error_mapping() {
        let not_found = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        assert!(matches!(
            ExportError::open("/x", not_found),
            ExportError::NotFound(_)
        ));

        let denied = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = ExportError::open("/x", denied);
        assert!(err.is_permission_error());
    }

    #[test]
    fn test_syscall_error_names_operation() {
        let err = ExportError::syscall(
            "sendfile",
            std::io::Error::from_raw_os_error(libc::EINVAL),
        );
        assert!(err.to_string().starts_with("sendfile failed"));
    }
}
