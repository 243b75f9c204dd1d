/// Namewire Error Types
///
/// One error type for every façade operation. Component-level errors
/// (names, keystore, native stack) convert into it with `?`.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::name::NameError;
use crate::stack::NativeError;

/// Main error type for Namewire operations
#[derive(Error, Debug)]
pub enum NamewireError {
    /// Identity could not be loaded or generated
    #[error("Keystore error: {0}")]
    Keystore(#[from] KeystoreError),

    /// Operation issued before the component it needs was started/initialized
    #[error("Not initialized: {0}")]
    NotInitialized(&'static str),

    /// Native handle invalidated by a fatal stack error
    #[error("Native handle closed")]
    HandleClosed,

    /// Name could not be parsed
    #[error("Malformed name: {0}")]
    MalformedName(#[from] NameError),

    /// Transient native stack failure for a single call
    #[error("Native stack error: {0}")]
    Native(NativeError),

    /// Native stack returned a non-positive status
    #[error("{op} rejected by native stack (status {code})")]
    Rejected { op: &'static str, code: i32 },

    /// IO error outside the native stack (e.g. spawning the loop thread)
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Result type alias for Namewire operations
pub type Result<T> = std::result::Result<T, NamewireError>;

impl NamewireError {
    /// Check if retrying the same call later may succeed
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Native(e) => !e.is_fatal(),
            Self::Rejected { .. } => true,
            Self::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }

    /// Check if the façade is unusable after this error
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::HandleClosed | Self::Keystore(_))
    }
}

/// Failures while loading, generating or persisting the signing identity.
#[derive(Error, Debug)]
pub enum KeystoreError {
    #[error("cannot access keystore {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("keystore {path} is corrupted: {reason}")]
    Corrupted { path: PathBuf, reason: String },

    #[error("no keystore location: set NAMEWIRE_KEYSTORE, NAMEWIRE_DIR or HOME")]
    NoLocation,
}

impl KeystoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn corrupted(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Corrupted {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(NamewireError::HandleClosed.is_fatal());
        assert!(!NamewireError::HandleClosed.is_recoverable());
        assert!(!NamewireError::NotInitialized("wrapper").is_fatal());

        let transient = NamewireError::Native(NativeError::transient(io::Error::new(
            io::ErrorKind::TimedOut,
            "slow face",
        )));
        assert!(transient.is_recoverable());
        assert!(!transient.is_fatal());

        let rejected = NamewireError::Rejected { op: "put_content", code: -1 };
        assert!(rejected.is_recoverable());
        assert_eq!(
            rejected.to_string(),
            "put_content rejected by native stack (status -1)"
        );
    }
}
