//! Datastore client capability boundary.
//!
//! The entity runtime is client-agnostic: anything that can fetch one record
//! or many records per model name, and describe its model graph, can sit
//! behind a [`DatastoreClient`]. Records cross the boundary as untyped JSON
//! maps; the ORM layer owns all typing above that.

mod options;

#[cfg(any(test, feature = "testing"))]
pub mod memory;

use async_trait::async_trait;
use quarry_model::Datamodel;
use serde_json::Value;

pub use options::{FindManyOptions, FindOneOptions, Select, Selection, Where};

/// One raw datastore row.
pub type Record = serde_json::Map<String, Value>;

/// Extract the `id` scalar from a raw record, if present.
pub fn record_id(record: &Record) -> Option<&str> {
    record.get("id").and_then(Value::as_str)
}

/// Fetch capability over one datastore.
///
/// Implementations may eagerly inline related rows under a relation's field
/// name when the request's `select` asks for them; the ORM detects inlined
/// data and skips the lazy round trip for it.
#[async_trait]
pub trait DatastoreClient: Send + Sync {
    /// Fetch a single record of `model` by id. Absence is not an error.
    async fn fetch_one(&self, model: &str, opts: &FindOneOptions)
        -> anyhow::Result<Option<Record>>;

    /// Fetch an ordered sequence of records of `model`.
    async fn fetch_many(&self, model: &str, opts: &FindManyOptions)
        -> anyhow::Result<Vec<Record>>;

    /// The full model metadata graph this client serves.
    fn datamodel(&self) -> Datamodel;
}
