//! # ShelfDB Storage
//!
//! Document backend trait and implementations for ShelfDB.
//!
//! A ShelfDB store persists as **one document**: every flush rewrites the
//! whole document. Backends are opaque byte holders; they never interpret
//! the encoded tree.
//!
//! ## Design Principles
//!
//! - A write replaces the previous document atomically or not at all
//! - No knowledge of collection keys, storage identifiers or records
//! - Must be `Send + Sync` so the writer task can own them
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For testing and ephemeral stores
//! - [`FileBackend`] - Persistent single-file storage with an exclusive lock
//!
//! ## Example
//!
//! ```rust
//! use shelfdb_storage::{DocumentBackend, InMemoryBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! backend.write_document(b"{}").unwrap();
//! assert_eq!(backend.read_document().unwrap(), Some(b"{}".to_vec()));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::DocumentBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
