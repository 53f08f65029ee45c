use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Opaque filter object forwarded to the datastore client.
pub type Where = Value;

/// Which relation fields to eagerly inline: `{ relationName: true | nested }`.
///
/// Backed by an ordered map so serialized selects are stable regardless of
/// construction order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Select(BTreeMap<String, Selection>);

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Selection {
    Include(bool),
    Nested(Select),
}

impl Selection {
    pub fn is_selected(&self) -> bool {
        match self {
            Selection::Include(included) => *included,
            Selection::Nested(_) => true,
        }
    }

    /// The nested select to apply to inlined rows, if one was given.
    pub fn nested(&self) -> Option<&Select> {
        match self {
            Selection::Nested(select) => Some(select),
            Selection::Include(_) => None,
        }
    }
}

impl Select {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select a relation field.
    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.0.insert(name.into(), Selection::Include(true));
        self
    }

    /// Select a relation field with a nested select for its rows.
    pub fn nested(mut self, name: impl Into<String>, select: Select) -> Self {
        self.0.insert(name.into(), Selection::Nested(select));
        self
    }

    pub fn get(&self, name: &str) -> Option<&Selection> {
        self.0.get(name)
    }

    pub fn is_selected(&self, name: &str) -> bool {
        self.get(name).is_some_and(Selection::is_selected)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Recognized options for a find-one fetch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FindOneOptions {
    pub id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub select: Option<Select>,
}

impl FindOneOptions {
    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            select: None,
        }
    }

    pub fn with_select(mut self, select: Select) -> Self {
        self.select = Some(select);
        self
    }
}

/// Recognized options for a find-many fetch.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FindManyOptions {
    #[serde(rename = "where", skip_serializing_if = "Option::is_none")]
    pub filter: Option<Where>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub select: Option<Select>,

    /// Keep only the first `n` records of the sequence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first: Option<usize>,

    /// Keep only the last `n` records of the sequence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last: Option<usize>,
}

impl FindManyOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_where(mut self, filter: Where) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_select(mut self, select: Select) -> Self {
        self.select = Some(select);
        self
    }

    pub fn take_first(mut self, n: usize) -> Self {
        self.first = Some(n);
        self
    }

    pub fn take_last(mut self, n: usize) -> Self {
        self.last = Some(n);
        self
    }
}
