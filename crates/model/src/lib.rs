//! Static model metadata for the quarry entity runtime.
//!
//! A [`Datamodel`] is an ordered set of [`ModelMetadata`] declarations, one per
//! entity type. Each model declares its scalar fields and its relation fields;
//! the entity manager looks models up by name and repositories use the field
//! declarations to partition raw records into scalars and lazily-loaded
//! relations.

mod field;
mod metadata;

pub use field::{FieldKind, FieldMetadata, ScalarType};
pub use metadata::{Datamodel, DatamodelError, ModelMetadata};
