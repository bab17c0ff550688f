//! In-memory document tree and its backing document.
//!
//! The tree maps `collection key -> storage id -> records`. It is loaded
//! once at open and afterwards mutated only by the write batcher, which
//! stages a copy, persists the copy, and swaps it in on success. Readers
//! therefore see either the tree before a batch or after it.

use crate::error::CoreResult;
use crate::types::{CollectionKey, StorageId};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use shelfdb_codec::{CodecResult, DocumentFormat};
use shelfdb_storage::DocumentBackend;
use std::collections::BTreeMap;
use std::sync::Arc;

/// The full store contents.
pub type DocumentTree = BTreeMap<CollectionKey, BTreeMap<StorageId, Vec<Value>>>;

pub(crate) type SharedBackend = Arc<Mutex<Box<dyn DocumentBackend>>>;

/// Document tree plus the backend it is persisted to.
pub struct DocumentStore {
    tree: RwLock<DocumentTree>,
    backend: SharedBackend,
    format: DocumentFormat,
}

impl DocumentStore {
    /// Loads the tree from `backend`.
    ///
    /// A backend that was never written, or holds an empty document,
    /// yields an empty tree.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read or the document does
    /// not decode as `format`.
    pub fn load(backend: Box<dyn DocumentBackend>, format: DocumentFormat) -> CoreResult<Self> {
        let tree = match backend.read_document()? {
            Some(bytes) if !bytes.is_empty() => format.decode::<DocumentTree>(&bytes)?,
            _ => DocumentTree::new(),
        };

        tracing::debug!(
            format = format.name(),
            collections = tree.len(),
            "document store loaded"
        );

        Ok(Self {
            tree: RwLock::new(tree),
            backend: Arc::new(Mutex::new(backend)),
            format,
        })
    }

    /// Runs `f` against the current tree under the read lock.
    pub fn read<R>(&self, f: impl FnOnce(&DocumentTree) -> R) -> R {
        f(&self.tree.read())
    }

    /// Returns a copy of the records under `(collection_key, storage_id)`.
    pub fn records(&self, collection_key: &CollectionKey, storage_id: &StorageId) -> Vec<Value> {
        self.read(|tree| {
            tree.get(collection_key)
                .and_then(|by_sid| by_sid.get(storage_id))
                .cloned()
                .unwrap_or_default()
        })
    }

    /// Returns a copy of the tree to apply a batch to.
    pub(crate) fn stage(&self) -> DocumentTree {
        self.tree.read().clone()
    }

    /// Swaps in `staged` and runs `on_commit` before readers can see it.
    pub(crate) fn commit(&self, staged: DocumentTree, on_commit: impl FnOnce()) {
        let mut tree = self.tree.write();
        *tree = staged;
        on_commit();
    }

    /// Encodes `tree` in the store's format.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn encode(&self, tree: &DocumentTree) -> CodecResult<Vec<u8>> {
        self.format.encode(tree)
    }

    pub(crate) fn backend(&self) -> SharedBackend {
        Arc::clone(&self.backend)
    }

    /// Returns the document format.
    pub fn format(&self) -> DocumentFormat {
        self.format
    }

    /// Lists collection keys present in the tree.
    pub fn collection_keys(&self) -> Vec<CollectionKey> {
        self.read(|tree| tree.keys().cloned().collect())
    }

    /// Lists storage ids present under `collection_key`.
    pub fn storage_ids(&self, collection_key: &CollectionKey) -> Vec<StorageId> {
        self.read(|tree| {
            tree.get(collection_key)
                .map(|by_sid| by_sid.keys().cloned().collect())
                .unwrap_or_default()
        })
    }

    /// Size in bytes of the persisted document.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot report its size.
    pub fn persisted_size(&self) -> CoreResult<u64> {
        Ok(self.backend.lock().size()?)
    }
}

impl std::fmt::Debug for DocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentStore")
            .field("format", &self.format)
            .field("collections", &self.tree.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shelfdb_storage::InMemoryBackend;

    fn sample_tree() -> DocumentTree {
        let mut tree = DocumentTree::new();
        tree.entry(CollectionKey::new("g1"))
            .or_default()
            .insert(StorageId::new("scores"), vec![json!({"id": "u1", "value": 1})]);
        tree
    }

    #[test]
    fn empty_backend_loads_empty_tree() {
        let store =
            DocumentStore::load(Box::new(InMemoryBackend::new()), DocumentFormat::Json).unwrap();
        assert!(store.collection_keys().is_empty());
        assert!(store
            .records(&CollectionKey::new("g1"), &StorageId::new("scores"))
            .is_empty());
    }

    #[test]
    fn loads_existing_document() {
        let bytes = DocumentFormat::Cbor.encode(&sample_tree()).unwrap();
        let backend = InMemoryBackend::with_document(bytes);
        let store = DocumentStore::load(Box::new(backend), DocumentFormat::Cbor).unwrap();

        assert_eq!(store.collection_keys(), vec![CollectionKey::new("g1")]);
        assert_eq!(
            store.storage_ids(&CollectionKey::new("g1")),
            vec![StorageId::new("scores")]
        );
        let records = store.records(&CollectionKey::new("g1"), &StorageId::new("scores"));
        assert_eq!(records, vec![json!({"id": "u1", "value": 1})]);
    }

    #[test]
    fn persisted_layout_is_plain_nested_objects() {
        let store =
            DocumentStore::load(Box::new(InMemoryBackend::new()), DocumentFormat::Json).unwrap();
        let bytes = store.encode(&sample_tree()).unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value, json!({"g1": {"scores": [{"id": "u1", "value": 1}]}}));
    }

    #[test]
    fn corrupt_document_fails_to_load() {
        let backend = InMemoryBackend::with_document(b"not json".to_vec());
        assert!(DocumentStore::load(Box::new(backend), DocumentFormat::Json).is_err());
    }

    #[test]
    fn commit_swaps_tree_and_runs_hook() {
        let store =
            DocumentStore::load(Box::new(InMemoryBackend::new()), DocumentFormat::Json).unwrap();
        let mut staged = store.stage();
        staged.extend(sample_tree());

        let mut ran = false;
        store.commit(staged, || ran = true);

        assert!(ran);
        assert_eq!(store.collection_keys().len(), 1);
    }
}
