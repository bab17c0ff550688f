//! Document formats.

use crate::error::{CodecError, CodecResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// On-disk format of the ShelfDB document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DocumentFormat {
    /// Pretty-printed JSON.
    #[default]
    Json,
    /// CBOR (RFC 8949).
    Cbor,
}

impl DocumentFormat {
    /// Short lowercase name, as used in errors and file extensions.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Cbor => "cbor",
        }
    }

    /// Encodes a document.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::EncodingFailed`] if the value cannot be
    /// represented in this format.
    pub fn encode<T: Serialize + ?Sized>(self, value: &T) -> CodecResult<Vec<u8>> {
        match self {
            Self::Json => serde_json::to_vec_pretty(value)
                .map_err(|e| CodecError::encoding_failed(self.name(), e.to_string())),
            Self::Cbor => {
                let mut out = Vec::new();
                ciborium::ser::into_writer(value, &mut out)
                    .map_err(|e| CodecError::encoding_failed(self.name(), e.to_string()))?;
                Ok(out)
            }
        }
    }

    /// Decodes a document.
    ///
    /// Empty input is rejected; callers treat a missing document
    /// separately.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::DecodingFailed`] for malformed input.
    pub fn decode<T: DeserializeOwned>(self, bytes: &[u8]) -> CodecResult<T> {
        if bytes.is_empty() {
            return Err(CodecError::decoding_failed(self.name(), "empty document"));
        }

        match self {
            Self::Json => serde_json::from_slice(bytes)
                .map_err(|e| CodecError::decoding_failed(self.name(), e.to_string())),
            Self::Cbor => ciborium::de::from_reader(bytes)
                .map_err(|e| CodecError::decoding_failed(self.name(), e.to_string())),
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DocumentFormat {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "cbor" => Ok(Self::Cbor),
            other => Err(CodecError::UnknownFormat(other.to_string())),
        }
    }
}
