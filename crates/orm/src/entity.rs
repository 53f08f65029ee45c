//! Materialized domain objects.
//!
//! An [`Entity`] is one record of a model, materialized by a repository:
//! scalar fields copied verbatim from the raw record, plus one
//! [`RelationAccessor`] per declared relation field. Scalars are immutable
//! after construction; the loader state inside each accessor is the only
//! mutable state an entity carries.
//!
//! [`EntityClass`] is the registration-time description of how records of one
//! model materialize. Base classes come from the generated declarations;
//! custom classes override a base class per model name and may layer derived
//! fields (computed values such as a `fullName`) on top without touching the
//! generated code.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use quarry_client::{record_id, Record};
use quarry_model::{FieldKind, ModelMetadata};
use serde_json::Value;

use crate::error::{OrmError, OrmResult};
use crate::loader::{RelationAccessor, RelationValue};

type DerivedFn = Arc<dyn Fn(&Entity) -> Value + Send + Sync>;

/// How records of one model materialize into entities.
///
/// Register instances with the entity manager as base or custom classes; a
/// custom class, when present for a model, is used in place of the base class
/// whenever a repository materializes a record of that model.
pub struct EntityClass {
    model_name: String,
    derived: Vec<(String, DerivedFn)>,
}

impl EntityClass {
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            derived: Vec::new(),
        }
    }

    /// Attach a derived field: a named value computed from the entity.
    pub fn with_derived(
        mut self,
        name: impl Into<String>,
        compute: impl Fn(&Entity) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.derived.push((name.into(), Arc::new(compute)));
        self
    }

    /// Finish construction; registrations and lookups work on shared handles.
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    fn derived(&self, name: &str) -> Option<&DerivedFn> {
        self.derived
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, compute)| compute)
    }
}

impl fmt::Debug for EntityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let derived: Vec<&str> = self.derived.iter().map(|(name, _)| name.as_str()).collect();

        f.debug_struct("EntityClass")
            .field("model_name", &self.model_name)
            .field("derived", &derived)
            .finish()
    }
}

/// A materialized record of one model.
///
/// Cheap to clone: clones share the underlying instance, including relation
/// loader state, so a relation resolved through any handle is resolved for
/// all of them.
#[derive(Clone)]
pub struct Entity {
    inner: Arc<EntityInner>,
}

struct EntityInner {
    metadata: Arc<ModelMetadata>,
    class: Arc<EntityClass>,
    scalars: Record,
    relations: BTreeMap<String, RelationAccessor>,
}

impl Entity {
    pub(crate) fn new(
        metadata: Arc<ModelMetadata>,
        class: Arc<EntityClass>,
        scalars: Record,
        relations: BTreeMap<String, RelationAccessor>,
    ) -> Self {
        Self {
            inner: Arc::new(EntityInner {
                metadata,
                class,
                scalars,
                relations,
            }),
        }
    }

    pub fn model(&self) -> &str {
        self.inner.metadata.name()
    }

    /// The record's `id` scalar, if present.
    pub fn id(&self) -> Option<&str> {
        record_id(&self.inner.scalars)
    }

    /// A scalar field value as copied from the raw record.
    pub fn scalar(&self, name: &str) -> Option<&Value> {
        self.inner.scalars.get(name)
    }

    /// A scalar field value as a string slice.
    pub fn scalar_str(&self, name: &str) -> Option<&str> {
        self.scalar(name).and_then(Value::as_str)
    }

    /// All scalar fields.
    pub fn scalars(&self) -> &Record {
        &self.inner.scalars
    }

    /// A scalar field, or a derived field computed by the entity's class.
    pub fn field(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.scalar(name) {
            return Some(value.clone());
        }

        self.inner
            .class
            .derived(name)
            .map(|compute| compute(self))
    }

    /// The lazy accessor for a relation field.
    pub fn relation(&self, name: &str) -> OrmResult<&RelationAccessor> {
        match self.inner.metadata.field(name).map(|f| f.kind()) {
            Some(FieldKind::Relation { .. }) => {
                self.inner.relations.get(name).ok_or_else(|| {
                    // declared relations always get an accessor at transform time
                    OrmError::UnknownField {
                        model: self.model().to_owned(),
                        field: name.to_owned(),
                    }
                })
            }
            Some(FieldKind::Scalar(_)) => Err(OrmError::NotARelation {
                model: self.model().to_owned(),
                field: name.to_owned(),
            }),
            None => Err(OrmError::UnknownField {
                model: self.model().to_owned(),
                field: name.to_owned(),
            }),
        }
    }

    /// Resolve a singular relation to its entity.
    pub async fn load_one(&self, name: &str) -> OrmResult<Entity> {
        match self.relation(name)?.load().await? {
            RelationValue::One(entity) => Ok(entity),
            RelationValue::Many(_) => Err(OrmError::ExpectedSingular {
                model: self.model().to_owned(),
                field: name.to_owned(),
            }),
        }
    }

    /// Resolve a list relation to its entities.
    pub async fn load_many(&self, name: &str) -> OrmResult<Vec<Entity>> {
        match self.relation(name)?.load().await? {
            RelationValue::Many(entities) => Ok(entities),
            RelationValue::One(_) => Err(OrmError::ExpectedList {
                model: self.model().to_owned(),
                field: name.to_owned(),
            }),
        }
    }

    /// Whether two handles refer to the same materialized instance.
    pub fn ptr_eq(a: &Entity, b: &Entity) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("model", &self.model())
            .field("scalars", &self.inner.scalars)
            .field("relations", &self.inner.relations)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use quarry_model::ScalarType;
    use serde_json::json;

    use super::*;

    fn user_entity(class: Arc<EntityClass>) -> Entity {
        let metadata = Arc::new(
            ModelMetadata::new("User")
                .with_scalar("id", ScalarType::Id)
                .with_scalar("firstName", ScalarType::String)
                .with_scalar("lastName", ScalarType::String)
                .with_relation("posts", "Post", true),
        );

        let scalars = json!({
            "id": "1",
            "firstName": "Ada",
            "lastName": "Lovelace",
        });

        Entity::new(
            metadata,
            class,
            scalars.as_object().cloned().unwrap(),
            BTreeMap::new(),
        )
    }

    #[test]
    fn scalars_are_copied_verbatim() {
        let entity = user_entity(EntityClass::new("User").shared());

        assert_eq!(entity.model(), "User");
        assert_eq!(entity.id(), Some("1"));
        assert_eq!(entity.scalar("firstName"), Some(&json!("Ada")));
        assert_eq!(entity.scalar("missing"), None);
    }

    #[test]
    fn derived_fields_compute_from_the_entity() {
        let class = EntityClass::new("User")
            .with_derived("fullName", |entity: &Entity| {
                json!(format!(
                    "{} {}",
                    entity.scalar_str("firstName").unwrap_or_default(),
                    entity.scalar_str("lastName").unwrap_or_default(),
                ))
            })
            .shared();
        let entity = user_entity(class);

        // scalars win over derived fields of the same name
        assert_eq!(entity.field("firstName"), Some(json!("Ada")));
        assert_eq!(entity.field("fullName"), Some(json!("Ada Lovelace")));
        assert_eq!(entity.field("nope"), None);
    }

    #[test]
    fn clones_share_the_instance() {
        let entity = user_entity(EntityClass::new("User").shared());
        let clone = entity.clone();

        assert!(Entity::ptr_eq(&entity, &clone));
    }
}
