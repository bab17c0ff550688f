//! In-memory document backend for testing.

use crate::backend::DocumentBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Default)]
struct Inner {
    document: Option<Vec<u8>>,
    writes: u64,
    attempts: u64,
    failures_remaining: u32,
}

/// An in-memory document backend.
///
/// Clones share the same underlying state, so a test can keep a handle
/// after moving the backend into a repository and observe how many
/// durable writes happened.
///
/// Writes can be made to fail with [`fail_next_writes`], which is how the
/// batcher's retry path is exercised.
///
/// [`fail_next_writes`]: InMemoryBackend::fail_next_writes
///
/// # Example
///
/// ```rust
/// use shelfdb_storage::{DocumentBackend, InMemoryBackend};
///
/// let handle = InMemoryBackend::new();
/// let mut backend = handle.clone();
/// backend.write_document(b"{}").unwrap();
/// assert_eq!(handle.write_count(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryBackend {
    /// Creates a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend that already holds a document.
    ///
    /// Useful for testing load paths.
    #[must_use]
    pub fn with_document(data: Vec<u8>) -> Self {
        let backend = Self::default();
        backend.inner.lock().document = Some(data);
        backend
    }

    /// Returns a copy of the current document.
    #[must_use]
    pub fn document(&self) -> Option<Vec<u8>> {
        self.inner.lock().document.clone()
    }

    /// Number of successful writes.
    #[must_use]
    pub fn write_count(&self) -> u64 {
        self.inner.lock().writes
    }

    /// Number of write attempts, including failed ones.
    #[must_use]
    pub fn attempt_count(&self) -> u64 {
        self.inner.lock().attempts
    }

    /// Makes the next `count` writes fail with
    /// [`StorageError::InjectedFailure`].
    pub fn fail_next_writes(&self, count: u32) {
        self.inner.lock().failures_remaining = count;
    }
}

impl DocumentBackend for InMemoryBackend {
    fn read_document(&self) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.inner.lock().document.clone())
    }

    fn write_document(&mut self, data: &[u8]) -> StorageResult<()> {
        let mut inner = self.inner.lock();
        inner.attempts += 1;

        if inner.failures_remaining > 0 {
            inner.failures_remaining -= 1;
            return Err(StorageError::InjectedFailure);
        }

        inner.document = Some(data.to_vec());
        inner.writes += 1;
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self
            .inner
            .lock()
            .document
            .as_ref()
            .map_or(0, |d| d.len() as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_backend_is_empty() {
        let backend = InMemoryBackend::new();
        assert!(backend.read_document().unwrap().is_none());
        assert_eq!(backend.size().unwrap(), 0);
        assert_eq!(backend.write_count(), 0);
    }

    #[test]
    fn clones_share_state() {
        let handle = InMemoryBackend::new();
        let mut writer = handle.clone();

        writer.write_document(b"shared").unwrap();

        assert_eq!(handle.document(), Some(b"shared".to_vec()));
        assert_eq!(handle.size().unwrap(), 6);
    }

    #[test]
    fn injected_failures_keep_previous_document() {
        let mut backend = InMemoryBackend::with_document(b"old".to_vec());
        backend.fail_next_writes(2);

        assert!(matches!(
            backend.write_document(b"new"),
            Err(StorageError::InjectedFailure)
        ));
        assert!(backend.write_document(b"new").is_err());
        assert_eq!(backend.document(), Some(b"old".to_vec()));

        backend.write_document(b"new").unwrap();
        assert_eq!(backend.document(), Some(b"new".to_vec()));
        assert_eq!(backend.attempt_count(), 3);
        assert_eq!(backend.write_count(), 1);
    }
}
