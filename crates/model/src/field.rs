use serde::{Deserialize, Serialize};

/// Scalar field types carried verbatim from raw records into entities.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScalarType {
    Id,
    String,
    Int,
    Float,
    Bool,
    Json,
}

/// What a declared field is: a scalar copied from the record, or a relation
/// that requires resolution against another model.
///
/// A field is always exactly one of the two.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum FieldKind {
    Scalar(ScalarType),
    Relation {
        /// Name of the target model.
        target: String,
        /// Whether the relation resolves to a sequence of entities.
        is_list: bool,
    },
}

/// One declared field of a model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldMetadata {
    name: String,
    kind: FieldKind,
}

impl FieldMetadata {
    /// Declare a scalar field.
    pub fn scalar(name: impl Into<String>, ty: ScalarType) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Scalar(ty),
        }
    }

    /// Declare a relation field pointing at `target`.
    pub fn relation(name: impl Into<String>, target: impl Into<String>, is_list: bool) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Relation {
                target: target.into(),
                is_list,
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    pub fn is_relation(&self) -> bool {
        matches!(self.kind, FieldKind::Relation { .. })
    }

    /// Whether this is a list relation. `false` for scalars.
    pub fn is_list(&self) -> bool {
        matches!(
            self.kind,
            FieldKind::Relation { is_list: true, .. }
        )
    }

    /// Target model name for relation fields, `None` for scalars.
    pub fn relation_target(&self) -> Option<&str> {
        match &self.kind {
            FieldKind::Relation { target, .. } => Some(target),
            FieldKind::Scalar(_) => None,
        }
    }
}
