//! Quarry entity runtime.
//!
//! Typed entities and per-model repositories over a pluggable datastore
//! client, with memoized lazy relation loading and fingerprint-keyed result
//! caching.
//!
//! # Example
//! ```ignore
//! use quarry_orm::prelude::*;
//!
//! let manager = EntityManager::new(EntityManagerOptions::new(client, registrations));
//!
//! let users = manager.repository("User")?;
//! let user = users.find_one(FindOneOptions::by_id("1")).await?;
//!
//! // Relations resolve on demand; concurrent callers share one fetch and
//! // the resolved value is memoized on the entity instance.
//! let posts = user.load_many("posts").await?;
//! ```

pub mod entity;
pub mod error;
mod fingerprint;
pub mod loader;
pub mod manager;
pub mod repository;

pub mod prelude;

/// Test fixtures: a seeded in-memory datastore and registrations for a small
/// blog datamodel.
///
/// Enabled under `#[cfg(test)]` or with the `testing` feature.
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use entity::{Entity, EntityClass};
pub use error::{OrmError, OrmResult};
pub use loader::{RelationAccessor, RelationValue};
pub use manager::{EntityManager, EntityManagerOptions, EntityRegistrations};
pub use repository::{CachedResult, CustomRepository, Repository};

// Re-export commonly used types from the runtime's collaborator crates
pub use quarry_cache::{MemoryCache, ResultCache};
pub use quarry_client::{
    record_id, DatastoreClient, FindManyOptions, FindOneOptions, Record, Select, Selection, Where,
};
pub use quarry_model::{Datamodel, FieldKind, FieldMetadata, ModelMetadata, ScalarType};
