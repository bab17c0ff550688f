//! Entity traits.
//!
//! Any serde-serializable type can be stored. Two optional capabilities
//! unlock extra operations:
//!
//! - [`Identified`]: id lookup, id-based delete and upsert
//! - [`Purgeable`]: age-based purging
//!
//! Capabilities are trait bounds on the operations that need them, so a
//! type lacking one is rejected by the compiler rather than at run time.

use serde::de::DeserializeOwned;
use serde::Serialize;

/// A record type that can be stored in a repository.
///
/// Blanket-implemented for every serde type that is `Clone + Send + Sync`.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> Entity for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

/// An entity with a string identifier.
///
/// The identifier should serialize under the `id` field so that persisted
/// records stay readable by other tools.
pub trait Identified {
    /// Returns the entity's identifier.
    fn id(&self) -> &str;
}

/// An entity carrying a creation timestamp.
///
/// Timestamps are ISO-8601 / RFC 3339 strings such as
/// `2024-05-01T12:00:00Z`.
pub trait Purgeable {
    /// Returns the entity's timestamp.
    fn timestamp(&self) -> &str;
}
