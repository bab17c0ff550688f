//! # ShelfDB Core
//!
//! Repository engine for small, file-backed document stores.
//!
//! This crate provides:
//! - A collection-key registry mapping entity types to storage ids and
//!   partition-key derivation functions
//! - A write batcher that coalesces single-record writes into one durable
//!   flush per batch
//! - A TTL + LRU cache over read results
//! - A query engine for filter / sort / paginate over in-memory collections
//! - The [`Repository`] façade tying them together
//!
//! ## Example
//!
//! ```rust,ignore
//! use shelfdb_core::{Repository, QueryOptions};
//!
//! let repo = Repository::open_in_memory().await?;
//! let scores = repo.register::<Score, _>("scores", |s| s.guild_id.clone())?;
//!
//! repo.store(&scores, &Score::new("g1", "u1", 10)).await?;
//! let top = repo.query(&scores, "g1", QueryOptions::new().limit(10))?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod batcher;
mod cache;
mod config;
mod document;
mod entity;
mod error;
mod query;
mod registry;
mod repository;
mod stats;
mod types;

pub use cache::{CacheKey, CacheLayer, CacheStats};
pub use config::{BatchConfig, CacheConfig, Config, RetryConfig};
pub use document::{DocumentStore, DocumentTree};
pub use entity::{Entity, Identified, Purgeable};
pub use error::{CoreError, CoreResult};
pub use query::{field_equals, Comparator, Filter, QueryOptions, QueryResult};
pub use registry::{EntityType, Registry};
pub use repository::{BulkFailure, BulkResult, Repository, UpsertOutcome};
pub use stats::{RepositoryStats, StatsSnapshot};
pub use types::{CollectionKey, StorageId};

pub use shelfdb_codec::DocumentFormat;
pub use shelfdb_storage::{DocumentBackend, FileBackend, InMemoryBackend};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
