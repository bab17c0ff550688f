//! Benchmark utilities.

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shelfdb_core::{CollectionKey, DocumentTree, StorageId};

/// Record shape used across benchmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchRecord {
    /// Identifier.
    pub id: String,
    /// Sort key.
    pub value: i64,
    /// Grouping field.
    pub bucket: u8,
}

/// Generate `count` records with random values.
pub fn generate_records(count: usize) -> Vec<BenchRecord> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|i| BenchRecord {
            id: format!("r{i}"),
            value: rng.gen_range(0..1_000_000),
            bucket: rng.gen_range(0..16),
        })
        .collect()
}

/// Build a document tree with `collections` keys of `per_collection` records.
pub fn generate_tree(collections: usize, per_collection: usize) -> DocumentTree {
    let mut tree = DocumentTree::new();
    for c in 0..collections {
        let records: Vec<Value> = generate_records(per_collection)
            .iter()
            .filter_map(|r| serde_json::to_value(r).ok())
            .collect();
        tree.entry(CollectionKey::new(format!("c{c}")))
            .or_default()
            .insert(StorageId::new("records"), records);
    }
    tree
}
