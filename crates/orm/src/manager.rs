//! The entity manager: top-level registry binding the datastore client, the
//! model metadata graph, the result cache, and the entity class
//! registrations, and handing out one repository per model.
//!
//! # Example
//! ```ignore
//! use quarry_orm::prelude::*;
//!
//! let registrations = EntityRegistrations::new()
//!     .base(EntityClass::new("User").shared())
//!     .base(EntityClass::new("Post").shared());
//!
//! let manager = EntityManager::new(EntityManagerOptions::new(client, registrations));
//! let users = manager.repository("User")?;
//! let user = users.find_one(FindOneOptions::by_id("1")).await?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use quarry_cache::{MemoryCache, ResultCache};
use quarry_client::DatastoreClient;
use quarry_model::ModelMetadata;
use tracing::debug;

use crate::entity::EntityClass;
use crate::error::{OrmError, OrmResult};
use crate::repository::{CachedResult, CustomRepository, Repository};

/// Entity classes to register, split into the generated base classes (one
/// per model) and the custom overrides layered on top of them.
#[derive(Clone, Debug, Default)]
pub struct EntityRegistrations {
    base: Vec<Arc<EntityClass>>,
    custom: Vec<Arc<EntityClass>>,
}

impl EntityRegistrations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a generated base entity class.
    pub fn base(mut self, class: Arc<EntityClass>) -> Self {
        self.base.push(class);
        self
    }

    /// Register a custom entity class; it replaces the base class whenever a
    /// repository materializes a record of its model.
    pub fn custom(mut self, class: Arc<EntityClass>) -> Self {
        self.custom.push(class);
        self
    }
}

/// Recognized options for constructing an [`EntityManager`].
pub struct EntityManagerOptions {
    client: Arc<dyn DatastoreClient>,
    entities: EntityRegistrations,
    cache: Option<Box<dyn ResultCache<CachedResult>>>,
}

impl EntityManagerOptions {
    pub fn new(client: Arc<dyn DatastoreClient>, entities: EntityRegistrations) -> Self {
        Self {
            client,
            entities,
            cache: None,
        }
    }

    /// Use a specific result cache instead of the default in-memory cache
    /// with its one-second TTL.
    pub fn with_cache(mut self, cache: impl ResultCache<CachedResult> + 'static) -> Self {
        self.cache = Some(Box::new(cache));
        self
    }
}

/// Shared core handed to every repository: the client, the cache, and the
/// registration maps. Repositories never keep their own copies of these.
pub(crate) struct ManagerCore {
    client: Arc<dyn DatastoreClient>,
    cache: Box<dyn ResultCache<CachedResult>>,
    metadata: HashMap<String, Arc<ModelMetadata>>,
    base_classes: HashMap<String, Arc<EntityClass>>,
    custom_classes: HashMap<String, Arc<EntityClass>>,
    registered: Vec<Arc<EntityClass>>,
}

impl ManagerCore {
    pub(crate) fn client(&self) -> &Arc<dyn DatastoreClient> {
        &self.client
    }

    pub(crate) fn cache(&self) -> &dyn ResultCache<CachedResult> {
        self.cache.as_ref()
    }

    pub(crate) fn metadata(&self, model: &str) -> OrmResult<Arc<ModelMetadata>> {
        self.metadata
            .get(model)
            .cloned()
            .ok_or_else(|| OrmError::MissingMetadata(model.to_owned()))
    }

    /// The entity class used to materialize records of `model`: the custom
    /// override when one is registered, the base class otherwise.
    pub(crate) fn class_for(&self, model: &str) -> OrmResult<Arc<EntityClass>> {
        self.custom_classes
            .get(model)
            .or_else(|| self.base_classes.get(model))
            .cloned()
            .ok_or_else(|| OrmError::UnregisteredEntity(model.to_owned()))
    }

    fn is_registered(&self, class: &Arc<EntityClass>) -> bool {
        self.registered
            .iter()
            .any(|registered| Arc::ptr_eq(registered, class))
    }
}

/// Top-level registry over one datastore client.
///
/// Constructed once with all entity classes known up front; lives for the
/// process (or test/request) lifetime. Hands out exactly one [`Repository`]
/// per model name.
pub struct EntityManager {
    core: Arc<ManagerCore>,
    repositories: RwLock<HashMap<String, Repository>>,
}

impl EntityManager {
    pub fn new(options: EntityManagerOptions) -> Self {
        // The model graph is read synchronously off the client up front;
        // repositories only ever consult the manager's copy.
        let datamodel = options.client.datamodel();
        let metadata = datamodel
            .models()
            .map(|model| (model.name().to_owned(), model.clone()))
            .collect();

        let EntityRegistrations { base, custom } = options.entities;
        let registered = base.iter().chain(custom.iter()).cloned().collect();
        let base_classes = base
            .into_iter()
            .map(|class| (class.model_name().to_owned(), class))
            .collect();
        let custom_classes = custom
            .into_iter()
            .map(|class| (class.model_name().to_owned(), class))
            .collect();

        let cache = options
            .cache
            .unwrap_or_else(|| Box::new(MemoryCache::new()));

        Self {
            core: Arc::new(ManagerCore {
                client: options.client,
                cache,
                metadata,
                base_classes,
                custom_classes,
                registered,
            }),
            repositories: RwLock::new(HashMap::new()),
        }
    }

    /// The singleton repository for a model name.
    ///
    /// Fails with [`OrmError::MissingMetadata`] when the datamodel has no
    /// declaration for the name. Repeated calls return the identical
    /// instance.
    pub fn repository(&self, model: impl AsRef<str>) -> OrmResult<Repository> {
        let model = model.as_ref();

        if let Some(repository) = self.repositories.read().get(model) {
            return Ok(repository.clone());
        }

        let metadata = self.core.metadata(model)?;

        let mut repositories = self.repositories.write();
        let repository = repositories.entry(model.to_owned()).or_insert_with(|| {
            debug!(model, "constructing repository");
            Repository::new(self.core.clone(), metadata)
        });

        Ok(repository.clone())
    }

    /// The singleton repository for a registered entity class.
    ///
    /// Fails with [`OrmError::UnregisteredEntity`] when `class` is not among
    /// the registered base or custom classes; nothing is cached on that path.
    pub fn repository_for(&self, class: &Arc<EntityClass>) -> OrmResult<Repository> {
        if !self.core.is_registered(class) {
            return Err(OrmError::UnregisteredEntity(class.model_name().to_owned()));
        }

        self.repository(class.model_name())
    }

    /// Instantiate a custom repository over its declared model.
    ///
    /// Custom repositories are constructed fresh per call; only the base
    /// per-model repositories are memoized.
    pub fn custom_repository<R: CustomRepository>(&self) -> OrmResult<R> {
        let metadata = self.core.metadata(R::model_name())?;

        Ok(R::from_repository(Repository::new(
            self.core.clone(),
            metadata,
        )))
    }

    /// Model metadata by name.
    pub fn metadata(&self, model: &str) -> OrmResult<Arc<ModelMetadata>> {
        self.core.metadata(model)
    }

    /// The datastore client this manager was constructed with.
    pub fn client(&self) -> &Arc<dyn DatastoreClient> {
        self.core.client()
    }
}
