//! Error type shared by every stage of the pipeline.

use thiserror::Error;

use crate::types::QrType;
use crate::validate::ValidationResult;

/// Root error type for qrsmith operations.
#[derive(Debug, Error)]
pub enum QrError {
    /// Blocking, field-scoped validation errors. Warnings never end up here.
    #[error("invalid input: {}", .0.summary())]
    Validation(ValidationResult),

    /// Malformed data reached an encoder despite validation.
    #[error("cannot encode {qr_type} payload: {message}")]
    Encoding { qr_type: QrType, message: String },

    /// The rendering primitive rejected the configuration.
    #[error("failed to render QR code: {0}")]
    Render(String),

    /// Logo decoding or compositing failed.
    #[error("failed to process logo: {0}")]
    Compositing(String),

    /// The operation was superseded by a newer request.
    #[error("operation cancelled")]
    Cancelled,

    #[error("invalid options: {0}")]
    InvalidOptions(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl QrError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation(_) | Self::InvalidOptions(_) => ErrorCategory::Input,
            Self::Encoding { .. } => ErrorCategory::Encoding,
            Self::Render(_) | Self::Compositing(_) => ErrorCategory::Render,
            Self::Cancelled => ErrorCategory::Cancelled,
            Self::Config(_) => ErrorCategory::Configuration,
            Self::Io(_) => ErrorCategory::Io,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<config::ConfigError> for QrError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

/// Error categories for display and exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Input,
    Encoding,
    Render,
    Cancelled,
    Configuration,
    Io,
}

pub type QrResult<T> = Result<T, QrError>;
