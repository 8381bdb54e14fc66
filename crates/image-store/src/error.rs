//! Image store errors.

use std::path::PathBuf;

/// Failures reported by an [`ImageStore`](crate::ImageStore).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("failed to read {path}: {message}")]
    Read { path: PathBuf, message: String },

    #[error("{path} has no channel '{channel}' in subimage {subimage}")]
    MissingChannel {
        path: PathBuf,
        subimage: usize,
        channel: String,
    },

    #[error("failed to write {path}: {message}")]
    Write { path: PathBuf, message: String },

    /// The request cannot be honored for any frame (format, layout,
    /// compression).
    #[error("unsupported: {message}")]
    Unsupported { message: String },

    /// The output location itself is unusable.
    #[error("output location unavailable at {path}: {message}")]
    OutputUnavailable { path: PathBuf, message: String },
}

impl StoreError {
    /// True for failures that would repeat on every frame of a run.
    pub fn is_setup_failure(&self) -> bool {
        matches!(
            self,
            StoreError::Unsupported { .. } | StoreError::OutputUnavailable { .. }
        )
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported {
            message: message.into(),
        }
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_classification() {
        assert!(StoreError::unsupported("half in png").is_setup_failure());
        assert!(StoreError::OutputUnavailable {
            path: PathBuf::from("/ro"),
            message: "read-only".into(),
        }
        .is_setup_failure());
        assert!(!StoreError::NotFound {
            path: PathBuf::from("/a.png"),
        }
        .is_setup_failure());
        assert!(!StoreError::Read {
            path: PathBuf::from("/a.png"),
            message: "truncated".into(),
        }
        .is_setup_failure());
    }
}
