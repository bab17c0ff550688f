//! Collection-key registry.
//!
//! Maps each entity type to its storage identifier and to the function
//! that derives a collection key from an instance. Derivation runs per
//! instance, so one type can be partitioned per tenant, per user, or
//! globally depending on run-time state.

use crate::entity::Entity;
use crate::error::{CoreError, CoreResult};
use crate::types::{CollectionKey, StorageId};
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

type DeriveFn<T> = dyn Fn(&T) -> String + Send + Sync;

struct Registration<T> {
    storage_id: StorageId,
    derive: Box<DeriveFn<T>>,
}

/// Registration token for entity type `T`.
///
/// Returned by [`Registry::register`] and passed to every repository
/// operation on `T`. Cheap to clone.
///
/// Repository operations only use the token to name `T`: they re-resolve
/// `T` against the repository's own registry, so a token left over from an
/// earlier registration of `T` uses the current mapping.
pub struct EntityType<T> {
    inner: Arc<Registration<T>>,
}

impl<T> Clone for EntityType<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for EntityType<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityType")
            .field("type", &std::any::type_name::<T>())
            .field("storage_id", &self.inner.storage_id)
            .finish()
    }
}

impl<T: Entity> EntityType<T> {
    /// Returns the storage identifier.
    pub fn storage_id(&self) -> &StorageId {
        &self.inner.storage_id
    }

    /// Derives the collection key for `entity`.
    pub fn collection_key_for(&self, entity: &T) -> CollectionKey {
        CollectionKey::new((self.inner.derive)(entity))
    }

    /// Returns the Rust type name of `T`.
    pub fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

#[derive(Default)]
struct RegistryInner {
    by_type: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    owners: HashMap<StorageId, (TypeId, &'static str)>,
}

/// Entity type registry.
///
/// Lookup is by exact type identity.
///
/// # Example
///
/// ```rust,ignore
/// let registry = Registry::new();
/// let scores = registry.register::<Score, _>("scores", |s| s.guild_id.clone())?;
/// assert_eq!(scores.storage_id().as_str(), "scores");
/// ```
#[derive(Default)]
pub struct Registry {
    inner: RwLock<RegistryInner>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `T` under `storage_id`.
    ///
    /// Registering the same type again replaces its previous mapping.
    ///
    /// # Errors
    ///
    /// - [`CoreError::MissingStorageId`] if `storage_id` is empty
    /// - [`CoreError::DuplicateStorageId`] if another type owns `storage_id`
    pub fn register<T, F>(
        &self,
        storage_id: impl Into<StorageId>,
        derive: F,
    ) -> CoreResult<EntityType<T>>
    where
        T: Entity,
        F: Fn(&T) -> String + Send + Sync + 'static,
    {
        let storage_id = storage_id.into();
        let type_name = std::any::type_name::<T>();
        if storage_id.as_str().trim().is_empty() {
            return Err(CoreError::MissingStorageId { type_name });
        }

        let type_id = TypeId::of::<T>();
        let mut inner = self.inner.write();

        if let Some(&(owner, existing)) = inner.owners.get(&storage_id) {
            if owner != type_id {
                return Err(CoreError::DuplicateStorageId {
                    storage_id: storage_id.to_string(),
                    existing,
                });
            }
        }

        // Re-registration under a new storage id releases the old one.
        inner.owners.retain(|_, (owner, _)| *owner != type_id);
        inner
            .owners
            .insert(storage_id.clone(), (type_id, type_name));

        let registration = Arc::new(Registration {
            storage_id,
            derive: Box::new(derive) as Box<DeriveFn<T>>,
        });
        inner.by_type.insert(
            type_id,
            Arc::clone(&registration) as Arc<dyn Any + Send + Sync>,
        );

        tracing::debug!(
            entity = type_name,
            storage_id = %registration.storage_id,
            "registered entity type"
        );

        Ok(EntityType {
            inner: registration,
        })
    }

    /// Returns the current registration for `T`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotRegistered`] if `T` was never registered.
    pub fn resolve<T: Entity>(&self) -> CoreResult<EntityType<T>> {
        let any = self
            .inner
            .read()
            .by_type
            .get(&TypeId::of::<T>())
            .cloned()
            .ok_or_else(CoreError::not_registered::<T>)?;

        let inner = any
            .downcast::<Registration<T>>()
            .map_err(|_| CoreError::not_registered::<T>())?;
        Ok(EntityType { inner })
    }

    /// Returns the registration for the type of `entity`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotRegistered`] if the type was never registered.
    pub fn resolve_for<T: Entity>(&self, _entity: &T) -> CoreResult<EntityType<T>> {
        self.resolve::<T>()
    }

    /// Returns true if `T` has a registration.
    pub fn contains<T: Entity>(&self) -> bool {
        self.inner.read().by_type.contains_key(&TypeId::of::<T>())
    }

    /// Lists registered storage identifiers in sorted order.
    pub fn storage_ids(&self) -> Vec<StorageId> {
        let mut ids: Vec<_> = self.inner.read().owners.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.inner.read().by_type.len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("storage_ids", &self.storage_ids())
            .finish()
    }
}
