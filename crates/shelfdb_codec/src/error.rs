//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur during encoding or decoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Failed to encode the document.
    #[error("encoding failed ({format}): {message}")]
    EncodingFailed {
        /// Format being written.
        format: &'static str,
        /// Description of the encoding error.
        message: String,
    },

    /// Failed to decode the document.
    #[error("decoding failed ({format}): {message}")]
    DecodingFailed {
        /// Format being read.
        format: &'static str,
        /// Description of the decoding error.
        message: String,
    },

    /// The format name is not recognised.
    #[error("unknown document format: {0}")]
    UnknownFormat(String),
}

impl CodecError {
    /// Create an encoding failed error.
    pub fn encoding_failed(format: &'static str, message: impl Into<String>) -> Self {
        Self::EncodingFailed {
            format,
            message: message.into(),
        }
    }

    /// Create a decoding failed error.
    pub fn decoding_failed(format: &'static str, message: impl Into<String>) -> Self {
        Self::DecodingFailed {
            format,
            message: message.into(),
        }
    }
}
