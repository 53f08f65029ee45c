//! In-memory stub client for tests.
//!
//! Serves per-model row tables out of process memory, honors `where` filters
//! of the `{ key: { "id": .. } }` shape, `first`/`last` windowing, and
//! select-driven eager inlining of related rows. Every fetch increments a
//! counter so tests can assert exactly how many round trips a scenario cost.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use heck::{ToLowerCamelCase, ToSnakeCase};
use quarry_model::{Datamodel, FieldMetadata, ModelMetadata};
use serde_json::Value;

use crate::{record_id, DatastoreClient, FindManyOptions, FindOneOptions, Record, Select};

/// Build a [`Record`] from a JSON object literal. Panics on non-objects;
/// intended for test fixtures only.
pub fn record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        other => panic!("record fixtures must be JSON objects, got: {other}"),
    }
}

/// In-memory [`DatastoreClient`] with a fetch-call counter.
pub struct MemoryClient {
    datamodel: Datamodel,
    tables: HashMap<String, Vec<Record>>,
    latency: Option<Duration>,
    calls: AtomicUsize,
}

impl MemoryClient {
    pub fn new(datamodel: Datamodel) -> Self {
        Self {
            datamodel,
            tables: HashMap::new(),
            latency: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Seed the table for `model` with `records`.
    pub fn with_records(mut self, model: impl Into<String>, records: Vec<Record>) -> Self {
        self.tables.insert(model.into(), records);
        self
    }

    /// Delay every fetch, emulating datastore latency.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Total fetches served so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn reset_calls(&self) {
        self.calls.store(0, Ordering::SeqCst);
    }

    async fn on_fetch(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn rows(&self, model: &str) -> &[Record] {
        self.tables.get(model).map(Vec::as_slice).unwrap_or(&[])
    }

    fn metadata(&self, model: &str) -> Option<&ModelMetadata> {
        self.datamodel.get(model).map(|metadata| metadata.as_ref())
    }

    /// Resolve a `where` key against `model`'s declared relations: the key is
    /// either a relation's own name or the lower-camel name of a related
    /// model, and maps to that relation's foreign-key column.
    fn link_column(&self, model: &str, key: &str) -> String {
        let Some(metadata) = self.metadata(model) else {
            return foreign_key(key);
        };

        if let Some(field) = metadata.field(key) {
            if field.is_relation() && !field.is_list() {
                return foreign_key(field.name());
            }
        }

        metadata
            .relation_fields()
            .find(|f| {
                !f.is_list()
                    && f.relation_target()
                        .is_some_and(|t| t.to_lower_camel_case() == key)
            })
            .map(|f| foreign_key(f.name()))
            .unwrap_or_else(|| foreign_key(key))
    }

    fn matches_where(&self, model: &str, row: &Record, filter: &Value) -> bool {
        let Some(conditions) = filter.as_object() else {
            return true;
        };

        conditions.iter().all(|(key, condition)| {
            match condition.get("id") {
                // `{ key: { id: .. } }` — match the relation's foreign key.
                Some(id) => row.get(&self.link_column(model, key)) == Some(id),
                // Plain equality on a scalar column.
                None => row.get(key) == Some(condition),
            }
        })
    }

    /// The foreign-key column on `target` rows that points back at `model`.
    fn back_reference(&self, target: &str, model: &str) -> Option<String> {
        self.metadata(target).and_then(|metadata| {
            metadata
                .relation_fields()
                .find(|f| !f.is_list() && f.relation_target() == Some(model))
                .map(|f| foreign_key(f.name()))
        })
    }

    /// Copy `row`, inlining related rows for every selected relation field.
    fn inline_selected(&self, model: &str, row: &Record, select: Option<&Select>) -> Record {
        let mut row = row.clone();

        let (Some(select), Some(metadata)) = (select, self.metadata(model)) else {
            return row;
        };

        for field in metadata.relation_fields() {
            let Some(selection) = select.get(field.name()) else {
                continue;
            };

            if !selection.is_selected() {
                continue;
            }

            let Some(target) = field.relation_target() else {
                continue;
            };

            let inlined = if field.is_list() {
                self.inline_list(model, target, &row, selection.nested())
            } else {
                self.inline_single(target, field, &row, selection.nested())
            };

            if let Some(inlined) = inlined {
                row.insert(field.name().to_owned(), inlined);
            }
        }

        row
    }

    fn inline_list(
        &self,
        model: &str,
        target: &str,
        row: &Record,
        nested: Option<&Select>,
    ) -> Option<Value> {
        let back_ref = self.back_reference(target, model)?;
        let id = row.get("id")?;

        let related: Vec<Value> = self
            .rows(target)
            .iter()
            .filter(|candidate| candidate.get(&back_ref) == Some(id))
            .map(|candidate| Value::Object(self.inline_selected(target, candidate, nested)))
            .collect();

        Some(Value::Array(related))
    }

    fn inline_single(
        &self,
        target: &str,
        field: &FieldMetadata,
        row: &Record,
        nested: Option<&Select>,
    ) -> Option<Value> {
        let fk = row
            .get(&foreign_key(field.name()))
            .or_else(|| row.get(field.name()))?
            .as_str()?;

        self.rows(target)
            .iter()
            .find(|candidate| record_id(candidate) == Some(fk))
            .map(|candidate| Value::Object(self.inline_selected(target, candidate, nested)))
    }
}

fn foreign_key(name: &str) -> String {
    format!("{}_id", name.to_snake_case())
}

#[async_trait]
impl DatastoreClient for MemoryClient {
    async fn fetch_one(
        &self,
        model: &str,
        opts: &FindOneOptions,
    ) -> anyhow::Result<Option<Record>> {
        self.on_fetch().await;

        Ok(self
            .rows(model)
            .iter()
            .find(|row| record_id(row) == Some(opts.id.as_str()))
            .map(|row| self.inline_selected(model, row, opts.select.as_ref())))
    }

    async fn fetch_many(
        &self,
        model: &str,
        opts: &FindManyOptions,
    ) -> anyhow::Result<Vec<Record>> {
        self.on_fetch().await;

        let mut rows: Vec<&Record> = self
            .rows(model)
            .iter()
            .filter(|row| {
                opts.filter
                    .as_ref()
                    .is_none_or(|filter| self.matches_where(model, row, filter))
            })
            .collect();

        if let Some(first) = opts.first {
            rows.truncate(first);
        }

        if let Some(last) = opts.last {
            let skip = rows.len().saturating_sub(last);
            rows.drain(..skip);
        }

        Ok(rows
            .into_iter()
            .map(|row| self.inline_selected(model, row, opts.select.as_ref()))
            .collect())
    }

    fn datamodel(&self) -> Datamodel {
        self.datamodel.clone()
    }
}
