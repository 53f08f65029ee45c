//! Cache key fingerprints.
//!
//! A fingerprint identifies one fetch: the operation kind, the model name,
//! and the canonical serialization of the request options. Canonical
//! serialization sorts map keys, so semantically identical option objects
//! fingerprint identically regardless of how their maps were built.

use serde::Serialize;
use serde_canonical_json::CanonicalFormatter;
use serde_json::Serializer;

use crate::error::{OrmError, OrmResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum FetchKind {
    FindOne,
    FindMany,
}

impl FetchKind {
    fn as_str(self) -> &'static str {
        match self {
            FetchKind::FindOne => "findOne",
            FetchKind::FindMany => "findMany",
        }
    }
}

pub(crate) fn fingerprint<T: Serialize>(
    kind: FetchKind,
    model: &str,
    opts: &T,
) -> OrmResult<String> {
    let mut ser = Serializer::with_formatter(Vec::new(), CanonicalFormatter::new());
    opts.serialize(&mut ser)
        .map_err(|err| OrmError::Serialize(err.to_string()))?;

    let options = String::from_utf8(ser.into_inner())
        .map_err(|err| OrmError::Serialize(err.to_string()))?;

    Ok(format!("{}:{}:{}", kind.as_str(), model, options))
}
