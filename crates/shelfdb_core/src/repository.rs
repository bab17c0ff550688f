//! Repository façade.
//!
//! [`Repository`] ties the registry, write batcher, cache, and query engine
//! together. Writes are async and resolve once durable; reads are
//! synchronous and served from the cache or the in-memory tree.
//!
//! # Example
//!
//! ```rust,ignore
//! use shelfdb_core::{QueryOptions, Repository, UpsertOutcome};
//!
//! let repo = Repository::open_in_memory().await?;
//! let scores = repo.register::<Score, _>("scores", |s| s.guild_id.clone())?;
//!
//! repo.store(&scores, &Score::new("g1", "u1", 10)).await?;
//! let outcome = repo.store_unique(&scores, &Score::new("g1", "u1", 99)).await?;
//! assert_eq!(outcome, UpsertOutcome::Updated);
//!
//! let top = repo.query(&scores, "g1", QueryOptions::new().limit(10))?;
//! ```
//!
//! # Ordering
//!
//! Deletes, purges, and upsert updates are evaluated by the writer against
//! the list as it stands after every write queued ahead of them, so they
//! never drop a record appended concurrently. The insert decision of
//! [`store_unique`](Repository::store_unique) is made from the committed
//! collection, so two concurrent upserts of the same new id may both insert.

use crate::batcher::{PendingWrite, RecordMatcher, WriteBatcher, WriteOp};
use crate::cache::{CacheKey, CacheLayer, CacheStats, ErasedValue};
use crate::config::Config;
use crate::document::{DocumentStore, DocumentTree};
use crate::entity::{Entity, Identified, Purgeable};
use crate::error::{CoreError, CoreResult};
use crate::query::{field_equals, QueryOptions, QueryResult};
use crate::registry::{EntityType, Registry};
use crate::stats::{RepositoryStats, StatsSnapshot};
use crate::types::{CollectionKey, StorageId};
use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shelfdb_storage::{DocumentBackend, FileBackend, InMemoryBackend, StorageError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Fallback timestamp layout for values without an offset, read as UTC.
const NAIVE_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

const MILLIS_PER_HOUR: f64 = 3_600_000.0;

/// Outcome of [`Repository::store_unique`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No record with the id existed; the entity was appended.
    Inserted,
    /// A record with the id was replaced in place.
    Updated,
}

/// A failed item in a bulk operation.
#[derive(Debug)]
pub struct BulkFailure {
    /// Position of the item in the input.
    pub index: usize,
    /// Why it failed.
    pub error: CoreError,
}

/// Outcome of a bulk operation.
///
/// Items are processed independently; successes are never rolled back.
#[derive(Debug, Default)]
pub struct BulkResult {
    /// Number of items that succeeded.
    pub succeeded: usize,
    /// Items that failed, in input order.
    pub failures: Vec<BulkFailure>,
}

impl BulkResult {
    /// Returns true if every item succeeded.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Number of items that failed.
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    fn record(&mut self, index: usize, result: CoreResult<()>) {
        match result {
            Ok(()) => self.succeeded += 1,
            Err(error) => self.failures.push(BulkFailure { index, error }),
        }
    }
}

/// Data-access handle for one document store.
pub struct Repository {
    config: Config,
    path: Option<PathBuf>,
    registry: Registry,
    store: Arc<DocumentStore>,
    cache: Arc<CacheLayer<ErasedValue>>,
    stats: Arc<RepositoryStats>,
    batcher: WriteBatcher,
}

impl Repository {
    /// Opens a file-backed repository at `path`.
    ///
    /// The store document is loaded into memory and an exclusive lock is
    /// held next to it until the repository is closed.
    ///
    /// # Errors
    ///
    /// - [`CoreError::StoreNotFound`] if the document is missing and
    ///   `create_if_missing` is off
    /// - a storage error if the store is locked by another handle
    /// - a codec error if the document does not decode
    pub async fn open(path: impl AsRef<Path>, config: Config) -> CoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let create_if_missing = config.create_if_missing;
        let format = config.format;

        let load_path = path.clone();
        let store = tokio::task::spawn_blocking(move || -> CoreResult<DocumentStore> {
            let backend = if create_if_missing {
                FileBackend::open_with_create_dirs(&load_path)?
            } else {
                if !load_path.exists() {
                    return Err(CoreError::StoreNotFound {
                        path: load_path.display().to_string(),
                    });
                }
                FileBackend::open(&load_path)?
            };
            DocumentStore::load(Box::new(backend), format)
        })
        .await
        .map_err(join_error)??;

        debug!(path = %path.display(), "repository opened");
        Ok(Self::from_store(config, store, Some(path)))
    }

    /// Opens a repository over an already constructed backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read or its document does
    /// not decode.
    pub async fn open_with_backend(
        config: Config,
        backend: Box<dyn DocumentBackend>,
    ) -> CoreResult<Self> {
        let format = config.format;
        let store = tokio::task::spawn_blocking(move || DocumentStore::load(backend, format))
            .await
            .map_err(join_error)??;
        Ok(Self::from_store(config, store, None))
    }

    /// Opens a non-persistent repository with default configuration.
    ///
    /// # Errors
    ///
    /// Never fails in practice; the signature matches the other openers.
    pub async fn open_in_memory() -> CoreResult<Self> {
        Self::open_with_backend(Config::default(), Box::new(InMemoryBackend::new())).await
    }

    fn from_store(config: Config, store: DocumentStore, path: Option<PathBuf>) -> Self {
        let store = Arc::new(store);
        let cache = Arc::new(CacheLayer::new(config.cache.clone()));
        let stats = Arc::new(RepositoryStats::new());
        let batcher = WriteBatcher::spawn(
            Arc::clone(&store),
            Arc::clone(&cache),
            Arc::clone(&stats),
            config.batch.clone(),
            config.retry.clone(),
        );

        Self {
            config,
            path,
            registry: Registry::new(),
            store,
            cache,
            stats,
            batcher,
        }
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Registers `T` under `storage_id` with a collection-key derivation.
    ///
    /// # Errors
    ///
    /// Fails if `storage_id` is empty or owned by another type.
    pub fn register<T, F>(
        &self,
        storage_id: impl Into<StorageId>,
        derive: F,
    ) -> CoreResult<EntityType<T>>
    where
        T: Entity,
        F: Fn(&T) -> String + Send + Sync + 'static,
    {
        self.registry.register(storage_id, derive)
    }

    /// Returns the current registration token for `T`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotRegistered`] if `T` was never registered.
    pub fn entity_type<T: Entity>(&self) -> CoreResult<EntityType<T>> {
        self.registry.resolve::<T>()
    }

    /// Returns the registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Re-resolves a token against this repository's registry.
    ///
    /// The current registration of `T` wins over the one the token was
    /// issued for.
    fn resolve<T: Entity>(&self, _token: &EntityType<T>) -> CoreResult<EntityType<T>> {
        self.registry.resolve::<T>()
    }

    fn ensure_open(&self) -> CoreResult<()> {
        if self.batcher.is_closed() {
            Err(CoreError::RepositoryClosed)
        } else {
            Ok(())
        }
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Appends `entity` to its collection.
    ///
    /// Resolves once the batch holding the write is durable.
    ///
    /// # Errors
    ///
    /// Fails if `T` is not registered, the repository is closed, or the
    /// batch could not be persisted.
    pub async fn store<T: Entity>(&self, ty: &EntityType<T>, entity: &T) -> CoreResult<()> {
        self.submit_store(ty, entity).await?.wait().await?;
        Ok(())
    }

    async fn submit_store<T: Entity>(
        &self,
        ty: &EntityType<T>,
        entity: &T,
    ) -> CoreResult<PendingWrite> {
        self.ensure_open()?;
        let ty = self.resolve(ty)?;
        let op = WriteOp::Append {
            collection_key: ty.collection_key_for(entity),
            storage_id: ty.storage_id().clone(),
            record: serde_json::to_value(entity)?,
        };
        self.batcher.submit(op).await
    }

    /// Inserts `entity`, or replaces the first record with the same id.
    ///
    /// Whether to insert is decided from the committed collection, so two
    /// concurrent calls for the same new id can both insert. The update
    /// itself is applied by the writer; if the record was deleted in the
    /// meantime the entity is appended and `Inserted` is returned.
    ///
    /// # Errors
    ///
    /// Same as [`store`](Self::store).
    pub async fn store_unique<T>(&self, ty: &EntityType<T>, entity: &T) -> CoreResult<UpsertOutcome>
    where
        T: Entity + Identified,
    {
        self.ensure_open()?;
        let ty = self.resolve(ty)?;
        let collection_key = ty.collection_key_for(entity);
        let exists = self
            .load_collection(&ty, &collection_key)?
            .iter()
            .any(|e| e.id() == entity.id());

        if !exists {
            self.store(&ty, entity).await?;
            return Ok(UpsertOutcome::Inserted);
        }

        let replaced = self
            .batcher
            .enqueue(WriteOp::UpdateFirst {
                collection_key,
                storage_id: ty.storage_id().clone(),
                record: serde_json::to_value(entity)?,
                select: id_matcher::<T>(entity.id(), true),
            })
            .await?;
        Ok(if replaced > 0 {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Inserted
        })
    }

    /// Overwrites a collection with `records` in one durable write.
    ///
    /// # Errors
    ///
    /// Fails if `T` is not registered, the repository is closed, or the
    /// write could not be persisted.
    pub async fn replace_all<T: Entity>(
        &self,
        ty: &EntityType<T>,
        collection_key: impl Into<CollectionKey>,
        records: Vec<T>,
    ) -> CoreResult<()> {
        self.ensure_open()?;
        let ty = self.resolve(ty)?;
        let records = records
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<Value>, _>>()?;
        self.batcher
            .enqueue(WriteOp::Replace {
                collection_key: collection_key.into(),
                storage_id: ty.storage_id().clone(),
                records,
            })
            .await?;
        Ok(())
    }

    /// Removes every record with `id` from a collection.
    ///
    /// Returns false, without writing, if nothing matched.
    ///
    /// # Errors
    ///
    /// Same as [`replace_all`](Self::replace_all).
    pub async fn delete_by_id<T>(
        &self,
        ty: &EntityType<T>,
        collection_key: impl Into<CollectionKey>,
        id: &str,
    ) -> CoreResult<bool>
    where
        T: Entity + Identified,
    {
        self.ensure_open()?;
        let ty = self.resolve(ty)?;

        let removed = self
            .batcher
            .enqueue(WriteOp::Retain {
                collection_key: collection_key.into(),
                storage_id: ty.storage_id().clone(),
                keep: id_matcher::<T>(id, false),
            })
            .await?;
        if removed == 0 {
            return Ok(false);
        }

        self.stats.record_deletes(removed as u64);
        Ok(true)
    }

    /// Deletes `entity` by the collection key and id it carries.
    ///
    /// # Errors
    ///
    /// Same as [`delete_by_id`](Self::delete_by_id).
    pub async fn delete_unique<T>(&self, ty: &EntityType<T>, entity: &T) -> CoreResult<bool>
    where
        T: Entity + Identified,
    {
        let ty = self.resolve(ty)?;
        let collection_key = ty.collection_key_for(entity);
        self.delete_by_id(&ty, collection_key, entity.id()).await
    }

    /// Removes records older than `max_age_hours`.
    ///
    /// A record survives only if its timestamp is strictly newer than
    /// `now - max_age_hours`. Records whose timestamp does not parse are
    /// removed. Returns the number of records removed.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] for a negative or non-finite
    /// age, otherwise the same errors as [`replace_all`](Self::replace_all).
    pub async fn purge_stale_items<T>(
        &self,
        ty: &EntityType<T>,
        collection_key: impl Into<CollectionKey>,
        max_age_hours: f64,
    ) -> CoreResult<usize>
    where
        T: Entity + Purgeable,
    {
        self.purge_stale_items_at(ty, collection_key, max_age_hours, Utc::now())
            .await
    }

    /// [`purge_stale_items`](Self::purge_stale_items) against a fixed clock.
    ///
    /// # Errors
    ///
    /// Same as [`purge_stale_items`](Self::purge_stale_items).
    pub async fn purge_stale_items_at<T>(
        &self,
        ty: &EntityType<T>,
        collection_key: impl Into<CollectionKey>,
        max_age_hours: f64,
        now: DateTime<Utc>,
    ) -> CoreResult<usize>
    where
        T: Entity + Purgeable,
    {
        self.ensure_open()?;
        let ty = self.resolve(ty)?;
        let collection_key = collection_key.into();
        let cutoff = purge_cutoff(now, max_age_hours)?;

        let storage_id = ty.storage_id().clone();
        let keep: RecordMatcher = Box::new(move |record: &Value| -> CoreResult<bool> {
            let entity = decode::<T>(record)?;
            Ok(match parse_timestamp(entity.timestamp()) {
                Some(ts) => ts > cutoff,
                None => {
                    warn!(
                        %storage_id,
                        timestamp = entity.timestamp(),
                        "unparseable timestamp, purging record"
                    );
                    false
                }
            })
        });
        let removed = self
            .batcher
            .enqueue(WriteOp::Retain {
                collection_key: collection_key.clone(),
                storage_id: ty.storage_id().clone(),
                keep,
            })
            .await?;
        if removed == 0 {
            return Ok(0);
        }

        self.stats.record_purged(removed as u64);
        debug!(
            storage_id = %ty.storage_id(),
            %collection_key,
            removed,
            "purged stale records"
        );
        Ok(removed)
    }

    /// Stores every entity, continuing past failures.
    ///
    /// All writes are queued before any is awaited, so they share batches.
    ///
    /// # Errors
    ///
    /// Fails only if `T` is not registered; per-item errors are reported
    /// in the result.
    pub async fn bulk_store<T: Entity>(
        &self,
        ty: &EntityType<T>,
        entities: &[T],
    ) -> CoreResult<BulkResult> {
        let ty = self.resolve(ty)?;

        let mut submitted = Vec::with_capacity(entities.len());
        for entity in entities {
            submitted.push(self.submit_store(&ty, entity).await);
        }

        let mut result = BulkResult::default();
        for (index, pending) in submitted.into_iter().enumerate() {
            let outcome = match pending {
                Ok(pending) => pending.wait().await.map(drop),
                Err(e) => Err(e),
            };
            result.record(index, outcome);
        }
        Ok(result)
    }

    /// Deletes every id, continuing past failures.
    ///
    /// An id with no matching record is reported as
    /// [`CoreError::EntityNotFound`].
    ///
    /// # Errors
    ///
    /// Fails only if `T` is not registered.
    pub async fn bulk_delete<T, S>(
        &self,
        ty: &EntityType<T>,
        collection_key: impl Into<CollectionKey>,
        ids: &[S],
    ) -> CoreResult<BulkResult>
    where
        T: Entity + Identified,
        S: AsRef<str>,
    {
        let ty = self.resolve(ty)?;
        let collection_key = collection_key.into();

        let mut result = BulkResult::default();
        for (index, id) in ids.iter().enumerate() {
            let id = id.as_ref();
            let outcome = match self.delete_by_id(&ty, collection_key.clone(), id).await {
                Ok(true) => Ok(()),
                Ok(false) => Err(CoreError::EntityNotFound {
                    storage_id: ty.storage_id().to_string(),
                    collection_key: collection_key.to_string(),
                    id: id.to_string(),
                }),
                Err(e) => Err(e),
            };
            result.record(index, outcome);
        }
        Ok(result)
    }

    /// Flushes every queued write without waiting for the debounce.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::RepositoryClosed`] after [`close`](Self::close).
    pub async fn flush_pending_writes(&self) -> CoreResult<()> {
        self.batcher.flush().await
    }

    /// Flushes pending writes and stops the writer.
    ///
    /// Later writes fail with [`CoreError::RepositoryClosed`]; reads keep
    /// working against the in-memory tree. Calling this twice is a no-op.
    ///
    /// # Errors
    ///
    /// Currently infallible.
    pub async fn close(&self) -> CoreResult<()> {
        if self.batcher.is_closed() {
            return Ok(());
        }
        self.batcher.shutdown().await;
        debug!(path = ?self.path, "repository closed");
        Ok(())
    }

    /// Returns true until [`close`](Self::close) is called.
    pub fn is_open(&self) -> bool {
        !self.batcher.is_closed()
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Returns every record in a collection, in stored order.
    ///
    /// # Errors
    ///
    /// Fails if `T` is not registered or a stored record does not
    /// deserialize as `T`.
    pub fn get_all<T: Entity>(
        &self,
        ty: &EntityType<T>,
        collection_key: impl Into<CollectionKey>,
    ) -> CoreResult<Vec<T>> {
        let ty = self.resolve(ty)?;
        self.stats.record_read();
        self.load_collection(&ty, &collection_key.into())
    }

    /// Returns the first record with `id`, if any.
    ///
    /// # Errors
    ///
    /// Same as [`get_all`](Self::get_all).
    pub fn get_by_id<T>(
        &self,
        ty: &EntityType<T>,
        collection_key: impl Into<CollectionKey>,
        id: &str,
    ) -> CoreResult<Option<T>>
    where
        T: Entity + Identified,
    {
        let ty = self.resolve(ty)?;
        let collection_key = collection_key.into();
        self.stats.record_read();

        let key = CacheKey::entity(ty.storage_id(), &collection_key, id);
        if let Some(hit) = self.cache.get(&key).and_then(|v| v.downcast::<T>().ok()) {
            return Ok(Some(hit.as_ref().clone()));
        }

        self.store.read(|tree| -> CoreResult<Option<T>> {
            let records = self.collection_locked(tree, &ty, &collection_key)?;
            let found = records.into_iter().find(|e| e.id() == id);
            if let Some(entity) = &found {
                let value: ErasedValue = Arc::new(entity.clone());
                self.cache.set(key, value);
            }
            Ok(found)
        })
    }

    /// Filters, sorts, and pages a collection.
    ///
    /// # Errors
    ///
    /// Same as [`get_all`](Self::get_all).
    pub fn query<T: Entity>(
        &self,
        ty: &EntityType<T>,
        collection_key: impl Into<CollectionKey>,
        options: QueryOptions<T>,
    ) -> CoreResult<QueryResult<T>> {
        let records = self.get_all(ty, collection_key)?;
        self.stats.record_query();
        Ok(options.execute(records))
    }

    /// Number of records in a collection.
    ///
    /// # Errors
    ///
    /// Same as [`get_all`](Self::get_all).
    pub fn count<T: Entity>(
        &self,
        ty: &EntityType<T>,
        collection_key: impl Into<CollectionKey>,
    ) -> CoreResult<usize> {
        Ok(self.get_all(ty, collection_key)?.len())
    }

    /// Number of records in a collection matching `predicate`.
    ///
    /// # Errors
    ///
    /// Same as [`get_all`](Self::get_all).
    pub fn count_where<T, F>(
        &self,
        ty: &EntityType<T>,
        collection_key: impl Into<CollectionKey>,
        predicate: F,
    ) -> CoreResult<usize>
    where
        T: Entity,
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let records = self.get_all(ty, collection_key)?;
        self.stats.record_query();
        Ok(QueryOptions::new().filter(predicate).count(&records))
    }

    /// Records whose serialized `field` equals `value`.
    ///
    /// # Errors
    ///
    /// Same as [`get_all`](Self::get_all).
    pub fn find_by_field<T, V>(
        &self,
        ty: &EntityType<T>,
        collection_key: impl Into<CollectionKey>,
        field: &str,
        value: V,
    ) -> CoreResult<Vec<T>>
    where
        T: Entity,
        V: Serialize,
    {
        let options = QueryOptions::<T>::new().filter(field_equals(field, value));
        Ok(self.query(ty, collection_key, options)?.entities)
    }

    /// First record whose serialized `field` equals `value`.
    ///
    /// # Errors
    ///
    /// Same as [`get_all`](Self::get_all).
    pub fn find_one_by_field<T, V>(
        &self,
        ty: &EntityType<T>,
        collection_key: impl Into<CollectionKey>,
        field: &str,
        value: V,
    ) -> CoreResult<Option<T>>
    where
        T: Entity,
        V: Serialize,
    {
        let options = QueryOptions::<T>::new()
            .filter(field_equals(field, value))
            .limit(1);
        Ok(self
            .query(ty, collection_key, options)?
            .entities
            .into_iter()
            .next())
    }

    fn load_collection<T: Entity>(
        &self,
        ty: &EntityType<T>,
        collection_key: &CollectionKey,
    ) -> CoreResult<Vec<T>> {
        self.store
            .read(|tree| self.collection_locked(tree, ty, collection_key))
    }

    /// Cache-first collection read. Runs under the tree read lock so a
    /// cache fill can never race a commit's invalidation.
    fn collection_locked<T: Entity>(
        &self,
        tree: &DocumentTree,
        ty: &EntityType<T>,
        collection_key: &CollectionKey,
    ) -> CoreResult<Vec<T>> {
        let key = CacheKey::collection(ty.storage_id(), collection_key);
        if let Some(hit) = self.cache.get(&key).and_then(|v| v.downcast::<Vec<T>>().ok()) {
            return Ok(hit.as_ref().clone());
        }

        let records = tree
            .get(collection_key)
            .and_then(|by_sid| by_sid.get(ty.storage_id()))
            .map(|values| {
                values
                    .iter()
                    .map(|v| serde_json::from_value::<T>(v.clone()))
                    .collect::<Result<Vec<T>, _>>()
            })
            .transpose()?
            .unwrap_or_default();

        let value: ErasedValue = Arc::new(records.clone());
        self.cache.set(key, value);
        Ok(records)
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// Returns cache counters.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Drops every cache entry.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Drops expired cache entries and returns how many were dropped.
    pub fn prune_cache(&self) -> usize {
        self.cache.prune_expired()
    }

    /// Returns repository counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Returns the document store.
    pub fn document_store(&self) -> &DocumentStore {
        &self.store
    }

    /// Collection keys present in the store.
    pub fn collection_keys(&self) -> Vec<CollectionKey> {
        self.store.collection_keys()
    }

    /// Returns the configuration the repository was opened with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Path of the store document, if file-backed.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("path", &self.path)
            .field("is_open", &self.is_open())
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

fn decode<T: Entity>(record: &Value) -> CoreResult<T> {
    Ok(T::deserialize(record)?)
}

/// Matches records whose id equals `id`, or differs from it when `equal`
/// is false.
fn id_matcher<T: Entity + Identified>(id: &str, equal: bool) -> RecordMatcher {
    let id = id.to_owned();
    Box::new(move |record: &Value| -> CoreResult<bool> {
        Ok((decode::<T>(record)?.id() == id) == equal)
    })
}

fn join_error(e: tokio::task::JoinError) -> CoreError {
    CoreError::Storage(StorageError::Io(std::io::Error::other(e.to_string())))
}

fn purge_cutoff(now: DateTime<Utc>, max_age_hours: f64) -> CoreResult<DateTime<Utc>> {
    if !max_age_hours.is_finite() || max_age_hours < 0.0 {
        return Err(CoreError::invalid_argument(format!(
            "max age must be a non-negative number of hours, got {max_age_hours}"
        )));
    }
    let millis = (max_age_hours * MILLIS_PER_HOUR).round() as i64;
    TimeDelta::try_milliseconds(millis)
        .and_then(|age| now.checked_sub_signed(age))
        .ok_or_else(|| {
            CoreError::invalid_argument(format!("max age of {max_age_hours} hours is out of range"))
        })
}

/// Parses an RFC 3339 timestamp, or an offset-less one taken as UTC.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, NAIVE_TIMESTAMP_FORMAT)
                .ok()
                .map(|naive| naive.and_utc())
        })
}
