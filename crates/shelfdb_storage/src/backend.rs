//! Document backend trait definition.

use crate::error::StorageResult;

/// A whole-document storage backend for ShelfDB.
///
/// Backends hold exactly one encoded document. The write batcher encodes
/// the full document tree after each batch and hands the bytes to
/// [`write_document`](DocumentBackend::write_document).
///
/// # Invariants
///
/// - `read_document` returns the bytes of the last successful write, or
///   `None` if nothing was ever written
/// - `write_document` either replaces the document entirely or leaves the
///   previous one untouched
/// - A successful `write_document` is durable
pub trait DocumentBackend: Send + Sync {
    /// Reads the current document.
    ///
    /// Returns `None` for a backend that has never been written.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn read_document(&self) -> StorageResult<Option<Vec<u8>>>;

    /// Durably replaces the current document with `data`.
    ///
    /// # Errors
    ///
    /// Returns an error if the write or sync fails. On error the previous
    /// document is still readable.
    fn write_document(&mut self, data: &[u8]) -> StorageResult<()>;

    /// Returns the size of the current document in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;
}
