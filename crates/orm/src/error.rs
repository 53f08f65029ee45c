use std::sync::Arc;

use thiserror::Error;

pub type OrmResult<T> = Result<T, OrmError>;

/// Errors surfaced by the entity runtime.
///
/// Every failure is scoped to the calling operation; nothing here is fatal to
/// the process. The enum is `Clone` because a single in-flight relation load
/// may have any number of concurrent waiters, all of which receive the same
/// rejection.
#[derive(Clone, Debug, Error)]
pub enum OrmError {
    /// An entity class that was never registered with the entity manager.
    #[error("entity class for model `{0}` is not registered with this entity manager")]
    UnregisteredEntity(String),

    /// The datamodel has no declaration for the resolved model name,
    /// usually a mismatch between generated code and runtime metadata.
    #[error("no model metadata found for `{0}`")]
    MissingMetadata(String),

    /// A find-one fetch yielded no record.
    #[error("no `{model}` record found for id `{id}`")]
    NotFound { model: String, id: String },

    /// The model declares no field under this name.
    #[error("model `{model}` has no field `{field}`")]
    UnknownField { model: String, field: String },

    /// The field exists but is a scalar or derived field, not a relation.
    #[error("field `{field}` on model `{model}` is not a relation")]
    NotARelation { model: String, field: String },

    /// `load_one` was called on a list relation.
    #[error("relation `{field}` on model `{model}` is a list; use load_many")]
    ExpectedSingular { model: String, field: String },

    /// `load_many` was called on a singular relation.
    #[error("relation `{field}` on model `{model}` is singular; use load_one")]
    ExpectedList { model: String, field: String },

    /// The raw record carries no key the runtime can use to resolve the
    /// relation (no parent id for lists, no foreign key for singulars).
    #[error("record of `{model}` has no key to resolve relation `{field}`")]
    MissingForeignKey { model: String, field: String },

    /// Query options could not be serialized into a cache fingerprint.
    #[error("could not serialize query options: {0}")]
    Serialize(String),

    /// The datastore client reported a failure.
    #[error("datastore client error: {0}")]
    Client(Arc<anyhow::Error>),
}

impl OrmError {
    pub(crate) fn client(err: anyhow::Error) -> Self {
        Self::Client(Arc::new(err))
    }
}
