//! # ShelfDB Codec
//!
//! Encoding and decoding of the persisted ShelfDB document.
//!
//! The document is a nested map (`collection key → storage id → records`)
//! and can be written in one of two formats:
//!
//! - [`DocumentFormat::Json`] - human-readable, the default
//! - [`DocumentFormat::Cbor`] - compact binary via `ciborium`
//!
//! Both formats carry the same logical structure; no schema version is
//! embedded.
//!
//! ## Usage
//!
//! ```
//! use shelfdb_codec::DocumentFormat;
//! use std::collections::BTreeMap;
//!
//! let mut doc: BTreeMap<String, Vec<i64>> = BTreeMap::new();
//! doc.insert("scores".into(), vec![10, 20]);
//!
//! let bytes = DocumentFormat::Json.encode(&doc).unwrap();
//! let decoded: BTreeMap<String, Vec<i64>> = DocumentFormat::Json.decode(&bytes).unwrap();
//! assert_eq!(doc, decoded);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod format;

pub use error::{CodecError, CodecResult};
pub use format::DocumentFormat;
