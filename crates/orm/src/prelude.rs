//! Prelude for convenient imports.
//!
//! # Example
//! ```ignore
//! use quarry_orm::prelude::*;
//!
//! let manager = EntityManager::new(EntityManagerOptions::new(client, registrations));
//! let user = manager.repository("User")?.find_one(FindOneOptions::by_id("1")).await?;
//! let posts = user.load_many("posts").await?;
//! ```

// Runtime types
pub use crate::{
    CachedResult, CustomRepository, Entity, EntityClass, EntityManager, EntityManagerOptions,
    EntityRegistrations, OrmError, OrmResult, RelationAccessor, RelationValue, Repository,
};

// Cache types
pub use quarry_cache::{MemoryCache, ResultCache};

// Client boundary types
pub use quarry_client::{
    record_id, DatastoreClient, FindManyOptions, FindOneOptions, Record, Select, Selection, Where,
};

// Model metadata types
pub use quarry_model::{Datamodel, FieldKind, FieldMetadata, ModelMetadata, ScalarType};
