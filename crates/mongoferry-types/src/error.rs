//! Error types and handling for mongoferry
//!
//! A single structured error type covers the whole workspace. Variants
//! map one-to-one onto the failure classes of the copy-and-transfer
//! engine: connectivity, validation, native tool execution, document
//! copy conflicts, storage backends and verification.

/// Main error type for mongoferry operations
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// An endpoint could not be reached or authenticated against
    #[error("connectivity error for {endpoint}: {message}")]
    Connectivity {
        /// Endpoint description (redacted URI or host)
        endpoint: String,
        /// Underlying cause
        message: String,
    },

    /// The operation specification is malformed or empty
    #[error("validation error: {message}")]
    Validation {
        /// What was wrong with the specification
        message: String,
    },

    /// A native dump/restore executable exited nonzero or timed out
    #[error("{tool} failed: {stderr}")]
    ToolExecution {
        /// Tool name (`mongodump` or `mongorestore`)
        tool: String,
        /// Captured standard error, or a timeout note
        stderr: String,
    },

    /// A document or index copy conflict in the fallback path
    #[error("copy error on '{collection}' (batch {batch_index}): {message}")]
    Copy {
        /// Collection being copied
        collection: String,
        /// Index of the offending batch, 0-based
        batch_index: u64,
        /// Underlying cause
        message: String,
    },

    /// A storage backend could not be connected or authenticated
    #[error("storage connection error ({backend}): {message}")]
    StorageConnection {
        /// Backend kind (`local`, `ssh`, `ftp`)
        backend: String,
        /// Underlying cause
        message: String,
    },

    /// A storage transfer failed after the connection was established
    #[error("storage transfer error ({backend}): {message}")]
    StorageTransfer {
        /// Backend kind (`local`, `ssh`, `ftp`)
        backend: String,
        /// Underlying cause
        message: String,
    },

    /// A post-copy verification check did not pass
    #[error("verification mismatch on '{collection}': {message}")]
    Verification {
        /// Collection that failed verification
        collection: String,
        /// Which check failed and how
        message: String,
    },

    /// Archive packing, unpacking, naming or checksum failure
    #[error("archive error: {message}")]
    Archive {
        /// Underlying cause
        message: String,
    },

    /// Configuration error
    #[error("configuration error: {message}")]
    Config {
        /// Underlying cause
        message: String,
    },

    /// I/O operation failed
    #[error("I/O error: {message}")]
    Io {
        /// Error message from the I/O operation
        message: String,
    },

    /// Operation timed out
    #[error("operation timed out after {seconds} seconds")]
    Timeout {
        /// Seconds after which the operation was abandoned
        seconds: u64,
    },

    /// Generic error with custom message
    #[error("{message}")]
    Other {
        /// Custom error message
        message: String,
    },
}

/// Error kind for categorizing errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Endpoint unreachable or authentication failure
    Connectivity,
    /// Malformed specification
    Validation,
    /// Native tool nonzero exit or timeout
    ToolExecution,
    /// Document or index copy conflict
    Copy,
    /// Storage backend connection failure
    StorageConnection,
    /// Storage transfer failure
    StorageTransfer,
    /// Verification mismatch
    Verification,
    /// Archive handling failure
    Archive,
    /// Configuration errors
    Config,
    /// I/O related errors
    Io,
    /// Timeout
    Timeout,
    /// Other errors
    Other,
}

impl Error {
    /// Get the error kind
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Connectivity { .. } => ErrorKind::Connectivity,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::ToolExecution { .. } => ErrorKind::ToolExecution,
            Self::Copy { .. } => ErrorKind::Copy,
            Self::StorageConnection { .. } => ErrorKind::StorageConnection,
            Self::StorageTransfer { .. } => ErrorKind::StorageTransfer,
            Self::Verification { .. } => ErrorKind::Verification,
            Self::Archive { .. } => ErrorKind::Archive,
            Self::Config { .. } => ErrorKind::Config,
            Self::Io { .. } => ErrorKind::Io,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Other { .. } => ErrorKind::Other,
        }
    }

    /// Check if a caller-level retry of the failed unit can succeed.
    ///
    /// Connectivity, transfer and timeout failures are transient by
    /// nature; validation and copy conflicts are not. A failed native
    /// tool invocation is terminal for that attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connectivity { .. }
            | Self::StorageConnection { .. }
            | Self::StorageTransfer { .. }
            | Self::Timeout { .. }
            | Self::Io { .. } => true,
            Self::Validation { .. }
            | Self::ToolExecution { .. }
            | Self::Copy { .. }
            | Self::Verification { .. }
            | Self::Archive { .. }
            | Self::Config { .. }
            | Self::Other { .. } => false,
        }
    }

    /// Create a new connectivity error
    pub fn connectivity<E: Into<String>, S: Into<String>>(endpoint: E, message: S) -> Self {
        Self::Connectivity {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a new tool execution error
    pub fn tool<T: Into<String>, S: Into<String>>(tool: T, stderr: S) -> Self {
        Self::ToolExecution {
            tool: tool.into(),
            stderr: stderr.into(),
        }
    }

    /// Create a new copy error
    pub fn copy<C: Into<String>, S: Into<String>>(
        collection: C,
        batch_index: u64,
        message: S,
    ) -> Self {
        Self::Copy {
            collection: collection.into(),
            batch_index,
            message: message.into(),
        }
    }

    /// Create a new storage connection error
    pub fn storage_connection<B: Into<String>, S: Into<String>>(backend: B, message: S) -> Self {
        Self::StorageConnection {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Create a new storage transfer error
    pub fn storage_transfer<B: Into<String>, S: Into<String>>(backend: B, message: S) -> Self {
        Self::StorageTransfer {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Create a new verification error
    pub fn verification<C: Into<String>, S: Into<String>>(collection: C, message: S) -> Self {
        Self::Verification {
            collection: collection.into(),
            message: message.into(),
        }
    }

    /// Create a new archive error
    pub fn archive<S: Into<String>>(message: S) -> Self {
        Self::Archive {
            message: message.into(),
        }
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new generic error
    pub fn other<S: Into<String>>(message: S) -> Self {
        Self::Other {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::Io {
            message: error.to_string(),
        }
    }
}

/// Result type alias using the mongoferry [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn error_kind_is_consistent(message in ".*") {
            let errors = vec![
                Error::validation(message.clone()),
                Error::archive(message.clone()),
                Error::config(message.clone()),
                Error::other(message.clone()),
                Error::connectivity("mongodb://host", message.clone()),
                Error::storage_connection("ssh", message.clone()),
                Error::storage_transfer("ftp", message.clone()),
            ];
            for error in errors {
                match error {
                    Error::Validation { .. } => prop_assert_eq!(error.kind(), ErrorKind::Validation),
                    Error::Archive { .. } => prop_assert_eq!(error.kind(), ErrorKind::Archive),
                    Error::Config { .. } => prop_assert_eq!(error.kind(), ErrorKind::Config),
                    Error::Other { .. } => prop_assert_eq!(error.kind(), ErrorKind::Other),
                    Error::Connectivity { .. } => {
                        prop_assert_eq!(error.kind(), ErrorKind::Connectivity);
                    }
                    Error::StorageConnection { .. } => {
                        prop_assert_eq!(error.kind(), ErrorKind::StorageConnection);
                    }
                    Error::StorageTransfer { .. } => {
                        prop_assert_eq!(error.kind(), ErrorKind::StorageTransfer);
                    }
                    _ => {}
                }
            }
        }

        #[test]
        fn retryable_errors_are_transient_kinds(seconds in 1u64..3600u64) {
            let error = Error::Timeout { seconds };
            prop_assert_eq!(error.kind(), ErrorKind::Timeout);
            prop_assert!(error.is_retryable());
        }
    }

    #[test]
    fn copy_error_carries_batch_context() {
        let error = Error::copy("users", 7, "duplicate key with differing content");
        assert_eq!(error.kind(), ErrorKind::Copy);
        assert!(!error.is_retryable());
        let rendered = error.to_string();
        assert!(rendered.contains("users"));
        assert!(rendered.contains("batch 7"));
    }

    #[test]
    fn tool_error_names_the_tool() {
        let error = Error::tool("mongodump", "Failed: collection not found");
        assert_eq!(error.kind(), ErrorKind::ToolExecution);
        assert!(error.to_string().starts_with("mongodump failed"));
        assert!(!error.is_retryable());
    }

    #[test]
    fn validation_error_is_not_retryable() {
        let error = Error::validation("empty collection selection");
        assert!(!error.is_retryable());
        assert!(error.to_string().contains("empty collection selection"));
    }

    #[test]
    fn io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "staging file");
        let error = Error::from(io_error);
        assert_eq!(error.kind(), ErrorKind::Io);
        assert!(error.is_retryable());
        assert!(error.to_string().contains("staging file"));
    }
}
