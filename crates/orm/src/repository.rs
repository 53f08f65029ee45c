//! Per-model fetch, transform, and caching.
//!
//! A [`Repository`] is the per-model front door to the datastore: it issues
//! client fetches, consults the result cache by request fingerprint, and
//! transforms raw records into entities with lazy relation accessors wired
//! in. Repositories hold nothing beyond a handle to their manager's core and
//! the one model declaration they were constructed with.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures_util::FutureExt;
use heck::{ToLowerCamelCase, ToSnakeCase};
use itertools::{Either, Itertools};
use quarry_client::{
    record_id, DatastoreClient, FindManyOptions, FindOneOptions, Record, Select,
};
use quarry_model::{FieldMetadata, ModelMetadata};
use serde_json::Value;
use tap::TapFallible;
use tracing::{debug, error, instrument, trace};

use crate::entity::Entity;
use crate::error::{OrmError, OrmResult};
use crate::fingerprint::{fingerprint, FetchKind};
use crate::loader::{LoadFn, RelationAccessor, RelationValue};
use crate::manager::ManagerCore;

/// Fetch results as stored in the result cache.
///
/// Cache hits hand back the previously constructed entities themselves, so
/// relation state memoized on an instance survives across hits.
#[derive(Clone, Debug)]
pub enum CachedResult {
    One(Entity),
    Many(Vec<Entity>),
}

/// A user-defined repository layered over the base machinery for one model.
///
/// Implementors wrap a [`Repository`] (typically also `Deref`ing to it) and
/// add bespoke finders on top; the entity manager constructs them via
/// [`EntityManager::custom_repository`](crate::EntityManager::custom_repository).
pub trait CustomRepository: Sized {
    /// The model this repository targets.
    fn model_name() -> &'static str;

    /// Build from the base repository machinery for that model.
    fn from_repository(repository: Repository) -> Self;
}

/// Per-model fetch + transform + cache component.
///
/// One instance exists per model name for the lifetime of its entity manager;
/// clones share that instance.
#[derive(Clone)]
pub struct Repository {
    inner: Arc<RepositoryInner>,
}

struct RepositoryInner {
    core: Arc<ManagerCore>,
    metadata: Arc<ModelMetadata>,
}

impl Repository {
    pub(crate) fn new(core: Arc<ManagerCore>, metadata: Arc<ModelMetadata>) -> Self {
        Self {
            inner: Arc::new(RepositoryInner { core, metadata }),
        }
    }

    pub fn model_name(&self) -> &str {
        self.inner.metadata.name()
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.inner.metadata
    }

    /// The datastore client this repository fetches through, for custom
    /// repositories issuing bespoke calls.
    pub fn client(&self) -> &Arc<dyn DatastoreClient> {
        self.inner.core.client()
    }

    /// Whether two handles refer to the same repository instance.
    pub fn ptr_eq(a: &Repository, b: &Repository) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// Fetch a single entity by id.
    ///
    /// Fails with [`OrmError::NotFound`] when the client yields nothing.
    #[instrument(name = "orm.find_one", skip(self, opts), fields(model = %self.model_name(), id = %opts.id))]
    pub async fn find_one(&self, opts: FindOneOptions) -> OrmResult<Entity> {
        let model = self.model_name().to_owned();
        self.find_one_for(&model, &opts).await
    }

    /// Fetch an ordered sequence of entities. An empty sequence is a valid
    /// result, not an error.
    #[instrument(name = "orm.find_many", skip(self, opts), fields(model = %self.model_name()))]
    pub async fn find_many(&self, opts: FindManyOptions) -> OrmResult<Vec<Entity>> {
        let model = self.model_name().to_owned();
        self.find_many_for(&model, &opts).await
    }

    /// Transform a raw record of this repository's model into an entity.
    ///
    /// Exposed so custom repositories can materialize records they fetched
    /// through bespoke client calls.
    pub fn record_to_entity(&self, record: &Record, select: Option<&Select>) -> OrmResult<Entity> {
        let model = self.model_name().to_owned();
        self.record_to_entity_for(&model, record, select)
    }

    /// Fetch-one against an arbitrary model through this repository's
    /// machinery; relation loads reuse this with their target model.
    async fn find_one_for(&self, model: &str, opts: &FindOneOptions) -> OrmResult<Entity> {
        let key = fingerprint(FetchKind::FindOne, model, opts)?;

        if let Some(CachedResult::One(entity)) = self.inner.core.cache().read(&key) {
            trace!(key = %key, "result cache hit");
            return Ok(entity);
        }

        debug!(model, id = %opts.id, "fetching record");
        let record = self
            .inner
            .core
            .client()
            .fetch_one(model, opts)
            .await
            .map_err(OrmError::client)
            .tap_err(|err| error!(model, %err, "datastore fetch failed"))?
            .ok_or_else(|| OrmError::NotFound {
                model: model.to_owned(),
                id: opts.id.clone(),
            })?;

        let entity = self.record_to_entity_for(model, &record, opts.select.as_ref())?;
        self.inner
            .core
            .cache()
            .write(&key, CachedResult::One(entity.clone()), None);

        Ok(entity)
    }

    async fn find_many_for(&self, model: &str, opts: &FindManyOptions) -> OrmResult<Vec<Entity>> {
        let key = fingerprint(FetchKind::FindMany, model, opts)?;

        if let Some(CachedResult::Many(entities)) = self.inner.core.cache().read(&key) {
            trace!(key = %key, "result cache hit");
            return Ok(entities);
        }

        debug!(model, "fetching records");
        let records = self
            .inner
            .core
            .client()
            .fetch_many(model, opts)
            .await
            .map_err(OrmError::client)
            .tap_err(|err| error!(model, %err, "datastore fetch failed"))?;

        let entities = records
            .iter()
            .map(|record| self.record_to_entity_for(model, record, opts.select.as_ref()))
            .collect::<OrmResult<Vec<_>>>()?;

        self.inner
            .core
            .cache()
            .write(&key, CachedResult::Many(entities.clone()), None);

        Ok(entities)
    }

    /// Transform one raw record of `model`: scalars are copied by name,
    /// relations get an accessor — pre-resolved when the select asked for the
    /// relation and the client inlined it, lazy otherwise.
    fn record_to_entity_for(
        &self,
        model: &str,
        record: &Record,
        select: Option<&Select>,
    ) -> OrmResult<Entity> {
        let metadata = self.inner.core.metadata(model)?;
        let class = self.inner.core.class_for(model)?;

        let (scalars, relations): (Vec<&FieldMetadata>, Vec<&FieldMetadata>) = metadata
            .fields()
            .iter()
            .partition_map(|field| {
                if field.is_relation() {
                    Either::Right(field)
                } else {
                    Either::Left(field)
                }
            });

        let mut scalar_values = Record::new();
        for field in scalars {
            if let Some(value) = record.get(field.name()) {
                scalar_values.insert(field.name().to_owned(), value.clone());
            }
        }

        let mut accessors = BTreeMap::new();
        for field in relations {
            let Some(target) = field.relation_target() else {
                continue;
            };

            let selection = select.and_then(|s| s.get(field.name()));
            let accessor = match selection.filter(|s| s.is_selected()) {
                Some(selection) => self
                    .inlined_accessor(target, field, record, selection.nested())?
                    .unwrap_or_else(|| self.lazy_accessor(&metadata, field, target, record)),
                None => self.lazy_accessor(&metadata, field, target, record),
            };

            accessors.insert(field.name().to_owned(), accessor);
        }

        Ok(Entity::new(metadata, class, scalar_values, accessors))
    }

    /// Pre-resolved accessor over relation data the client eagerly inlined
    /// into the record. `None` when the record carries no usable inline data,
    /// in which case the relation stays lazy.
    fn inlined_accessor(
        &self,
        target: &str,
        field: &FieldMetadata,
        record: &Record,
        nested: Option<&Select>,
    ) -> OrmResult<Option<RelationAccessor>> {
        let value = match (field.is_list(), record.get(field.name())) {
            (true, Some(Value::Array(rows))) => {
                let mut entities = Vec::with_capacity(rows.len());
                for row in rows {
                    if let Some(row) = row.as_object() {
                        entities.push(self.record_to_entity_for(target, row, nested)?);
                    }
                }
                Some(RelationValue::Many(entities))
            }
            (false, Some(Value::Object(row))) => Some(RelationValue::One(
                self.record_to_entity_for(target, row, nested)?,
            )),
            _ => None,
        };

        Ok(value.map(RelationAccessor::resolved))
    }

    fn lazy_accessor(
        &self,
        parent: &Arc<ModelMetadata>,
        field: &FieldMetadata,
        target: &str,
        record: &Record,
    ) -> RelationAccessor {
        if field.is_list() {
            self.lazy_list_accessor(parent, field, target, record)
        } else {
            self.lazy_single_accessor(parent, field, target, record)
        }
    }

    /// List relations load with a where-clause linking the target back to
    /// this record's id under the parent model's derived key.
    fn lazy_list_accessor(
        &self,
        parent: &Arc<ModelMetadata>,
        field: &FieldMetadata,
        target: &str,
        record: &Record,
    ) -> RelationAccessor {
        let repository = self.clone();
        let parent_model = parent.name().to_owned();
        let link_key = parent.name().to_lower_camel_case();
        let relation = field.name().to_owned();
        let target = target.to_owned();
        let parent_id = record_id(record).map(str::to_owned);

        let load: LoadFn = Arc::new(move || {
            let repository = repository.clone();
            let parent_model = parent_model.clone();
            let link_key = link_key.clone();
            let relation = relation.clone();
            let target = target.clone();
            let parent_id = parent_id.clone();

            async move {
                let id = parent_id.ok_or_else(|| OrmError::MissingForeignKey {
                    model: parent_model.clone(),
                    field: relation.clone(),
                })?;

                debug!(model = %target, relation = %relation, parent_id = %id, "lazily loading list relation");

                let opts = FindManyOptions::new().with_where(link_filter(&link_key, &id));
                repository
                    .find_many_for(&target, &opts)
                    .await
                    .map(RelationValue::Many)
            }
            .boxed()
        });

        RelationAccessor::lazy(load)
    }

    /// Singular relations load by the foreign key carried on the record,
    /// either under `<relation>_id` or inline under the relation name.
    fn lazy_single_accessor(
        &self,
        parent: &Arc<ModelMetadata>,
        field: &FieldMetadata,
        target: &str,
        record: &Record,
    ) -> RelationAccessor {
        let repository = self.clone();
        let parent_model = parent.name().to_owned();
        let relation = field.name().to_owned();
        let target = target.to_owned();
        let foreign_id = record
            .get(&foreign_key(field.name()))
            .or_else(|| record.get(field.name()))
            .and_then(Value::as_str)
            .map(str::to_owned);

        let load: LoadFn = Arc::new(move || {
            let repository = repository.clone();
            let parent_model = parent_model.clone();
            let relation = relation.clone();
            let target = target.clone();
            let foreign_id = foreign_id.clone();

            async move {
                let id = foreign_id.ok_or_else(|| OrmError::MissingForeignKey {
                    model: parent_model.clone(),
                    field: relation.clone(),
                })?;

                debug!(model = %target, relation = %relation, id = %id, "lazily loading relation");

                repository
                    .find_one_for(&target, &FindOneOptions::by_id(id))
                    .await
                    .map(RelationValue::One)
            }
            .boxed()
        });

        RelationAccessor::lazy(load)
    }
}

fn foreign_key(relation: &str) -> String {
    format!("{}_id", relation.to_snake_case())
}

/// `{ <link_key>: { "id": <id> } }`
fn link_filter(link_key: &str, id: &str) -> Value {
    let mut condition = serde_json::Map::new();
    condition.insert("id".to_owned(), Value::String(id.to_owned()));

    let mut filter = serde_json::Map::new();
    filter.insert(link_key.to_owned(), Value::Object(condition));

    Value::Object(filter)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn foreign_key_derivation() {
        assert_eq!(foreign_key("author"), "author_id");
        assert_eq!(foreign_key("parentComment"), "parent_comment_id");
    }

    #[test]
    fn link_filter_shape() {
        assert_eq!(
            link_filter("user", "1"),
            json!({ "user": { "id": "1" } })
        );
    }
}
