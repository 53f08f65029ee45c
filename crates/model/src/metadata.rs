use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::field::{FieldMetadata, ScalarType};

#[derive(Error, Debug)]
pub enum DatamodelError {
    #[error("duplicate model declaration: `{0}`")]
    DuplicateModel(String),
}

/// Declaration of one entity type: its name plus its scalar and relation
/// fields. Immutable once loaded into a [`Datamodel`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    name: String,
    fields: Vec<FieldMetadata>,
}

impl ModelMetadata {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Declare a scalar field.
    pub fn with_scalar(mut self, name: impl Into<String>, ty: ScalarType) -> Self {
        self.fields.push(FieldMetadata::scalar(name, ty));
        self
    }

    /// Declare a relation field pointing at `target`.
    pub fn with_relation(
        mut self,
        name: impl Into<String>,
        target: impl Into<String>,
        is_list: bool,
    ) -> Self {
        self.fields.push(FieldMetadata::relation(name, target, is_list));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldMetadata] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldMetadata> {
        self.fields.iter().find(|f| f.name() == name)
    }

    pub fn scalar_fields(&self) -> impl Iterator<Item = &FieldMetadata> {
        self.fields.iter().filter(|f| !f.is_relation())
    }

    pub fn relation_fields(&self) -> impl Iterator<Item = &FieldMetadata> {
        self.fields.iter().filter(|f| f.is_relation())
    }
}

/// The full model graph: an ordered list of model declarations with by-name
/// lookup. One metadata instance per model name.
#[derive(Clone, Debug, Default)]
pub struct Datamodel {
    models: Vec<Arc<ModelMetadata>>,
    by_name: HashMap<String, Arc<ModelMetadata>>,
}

impl Datamodel {
    pub fn new(models: Vec<ModelMetadata>) -> Result<Self, DatamodelError> {
        let mut datamodel = Self::default();

        for model in models {
            let model = Arc::new(model);

            if datamodel
                .by_name
                .insert(model.name().to_owned(), model.clone())
                .is_some()
            {
                return Err(DatamodelError::DuplicateModel(model.name().to_owned()));
            }

            datamodel.models.push(model);
        }

        Ok(datamodel)
    }

    /// Models in declaration order.
    pub fn models(&self) -> impl Iterator<Item = &Arc<ModelMetadata>> {
        self.models.iter()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<ModelMetadata>> {
        self.by_name.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn user_model() -> ModelMetadata {
        ModelMetadata::new("User")
            .with_scalar("id", ScalarType::Id)
            .with_scalar("firstName", ScalarType::String)
            .with_relation("posts", "Post", true)
    }

    #[test]
    fn field_partition() {
        let model = user_model();

        let scalars: Vec<_> = model.scalar_fields().map(FieldMetadata::name).collect();
        let relations: Vec<_> = model.relation_fields().map(FieldMetadata::name).collect();

        assert_eq!(scalars, vec!["id", "firstName"]);
        assert_eq!(relations, vec!["posts"]);
    }

    #[test]
    fn relation_field_shape() {
        let model = user_model();
        let posts = model.field("posts").unwrap();

        assert!(posts.is_relation());
        assert!(posts.is_list());
        assert_eq!(posts.relation_target(), Some("Post"));
        assert_eq!(model.field("id").unwrap().relation_target(), None);
    }

    #[test]
    fn lookup_by_name() {
        let datamodel = Datamodel::new(vec![user_model(), ModelMetadata::new("Post")]).unwrap();

        assert_eq!(datamodel.len(), 2);
        assert!(datamodel.contains("User"));
        assert!(datamodel.get("Missing").is_none());
        assert_eq!(
            datamodel.models().map(|m| m.name()).collect::<Vec<_>>(),
            vec!["User", "Post"]
        );
    }

    #[test]
    fn duplicate_models_rejected() {
        let result = Datamodel::new(vec![user_model(), user_model()]);

        assert!(matches!(
            result,
            Err(DatamodelError::DuplicateModel(name)) if name == "User"
        ));
    }
}
