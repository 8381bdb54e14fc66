//! Error types shared across seqmix crates.

use std::path::PathBuf;

/// Top-level error type for seqmix operations.
#[derive(Debug, thiserror::Error)]
pub enum SeqmixError {
    #[error("Discovery error: {message}")]
    Discovery { message: String },

    #[error("Export error: {message}")]
    Export { message: String },

    #[error("Image store error: {message}")]
    ImageStore { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type alias using SeqmixError.
pub type SeqmixResult<T> = Result<T, SeqmixError>;

impl SeqmixError {
    pub fn discovery(msg: impl Into<String>) -> Self {
        Self::Discovery {
            message: msg.into(),
        }
    }

    pub fn export(msg: impl Into<String>) -> Self {
        Self::Export {
            message: msg.into(),
        }
    }

    pub fn image_store(msg: impl Into<String>) -> Self {
        Self::ImageStore {
            message: msg.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_helper_constructors_format_messages() {
        let err = SeqmixError::discovery("pattern does not round-trip");
        assert_eq!(
            err.to_string(),
            "Discovery error: pattern does not round-trip"
        );

        let err = SeqmixError::export("no frame range policy selected");
        assert_eq!(err.to_string(), "Export error: no frame range policy selected");
    }

    #[test]
    fn test_io_error_converts_transparently() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let err: SeqmixError = io.into();
        assert!(matches!(err, SeqmixError::Io(_)));
        assert_eq!(err.to_string(), "read-only");
    }
}
