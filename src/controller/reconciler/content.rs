//! # Change Detection
//!
//! Decides whether an existing object needs to be overwritten by its rendered
//! counterpart.
//!
//! Every object is classified into one [`ContentShape`] (`spec` wins over
//! `data`, which wins over `stringData`). Its body, labels and annotations are
//! fingerprinted independently, and two objects are equal only when all three
//! fingerprints match.
//!
//! `stringData` values are base64-encoded before hashing so a desired Secret
//! written with `stringData` compares equal to the stored Secret, which the API
//! server only ever returns with `data`.

use super::error::ReplicationError;
use super::fingerprint::fingerprint_value;
use base64::{engine::general_purpose::STANDARD, Engine};
use kube::api::DynamicObject;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

const SPEC: &str = "spec";
const DATA: &str = "data";
const STRING_DATA: &str = "stringData";

/// Content body of an object
#[derive(Debug, Clone, PartialEq)]
pub enum ContentShape {
    Spec(Value),
    Data(Value),
    StringData(Value),
    Unknown,
}

impl ContentShape {
    /// Classify an object body (everything besides `apiVersion`, `kind` and `metadata`)
    #[must_use]
    pub fn classify(body: &Value) -> Self {
        let field = |name: &str| body.get(name).filter(|v| !v.is_null()).cloned();

        if let Some(spec) = field(SPEC) {
            ContentShape::Spec(spec)
        } else if let Some(data) = field(DATA) {
            ContentShape::Data(data)
        } else if let Some(string_data) = field(STRING_DATA) {
            ContentShape::StringData(string_data)
        } else {
            ContentShape::Unknown
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            ContentShape::Spec(_) => SPEC,
            ContentShape::Data(_) => DATA,
            ContentShape::StringData(_) => STRING_DATA,
            ContentShape::Unknown => "unknown",
        }
    }

    #[must_use]
    pub fn is_unknown(&self) -> bool {
        matches!(self, ContentShape::Unknown)
    }

    /// Same shape with an empty body, [`ContentShape::Unknown`] stays unknown
    #[must_use]
    pub fn emptied(&self) -> Self {
        let empty = || Value::Object(Map::new());
        match self {
            ContentShape::Spec(_) => ContentShape::Spec(empty()),
            ContentShape::Data(_) => ContentShape::Data(empty()),
            ContentShape::StringData(_) => ContentShape::StringData(empty()),
            ContentShape::Unknown => ContentShape::Unknown,
        }
    }

    /// Fingerprint of the canonical body, `None` for [`ContentShape::Unknown`]
    #[must_use]
    pub fn content_hash(&self) -> Option<String> {
        match self {
            ContentShape::Spec(body) | ContentShape::Data(body) => Some(fingerprint_value(body)),
            ContentShape::StringData(body) => Some(fingerprint_value(&encode_string_data(body))),
            ContentShape::Unknown => None,
        }
    }
}

/// The three fingerprints compared for every object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentFingerprint {
    pub content: String,
    pub labels: String,
    pub annotations: String,
}

impl ContentFingerprint {
    /// Fingerprint an object, `None` when its content shape is unknown
    #[must_use]
    pub fn of(object: &DynamicObject) -> Option<Self> {
        Self::with_shape(object, &ContentShape::classify(&object.data))
    }

    fn with_shape(object: &DynamicObject, shape: &ContentShape) -> Option<Self> {
        let content = shape.content_hash()?;
        Some(Self {
            content,
            labels: metadata_hash(object.metadata.labels.as_ref()),
            annotations: metadata_hash(object.metadata.annotations.as_ref()),
        })
    }
}

/// Whether `existing` must be overwritten with `desired`
///
/// A desired object without a recognized content shape is an error. The API
/// server drops empty bodies, so an existing object without one is compared as
/// an empty body of the desired shape.
pub fn needs_update(
    desired: &DynamicObject,
    existing: &DynamicObject,
) -> Result<bool, ReplicationError> {
    let desired_shape = ContentShape::classify(&desired.data);
    let Some(desired_fingerprint) = ContentFingerprint::with_shape(desired, &desired_shape) else {
        return Err(unknown_shape(desired));
    };

    let existing_shape = match ContentShape::classify(&existing.data) {
        ContentShape::Unknown => desired_shape.emptied(),
        shape => shape,
    };
    Ok(ContentFingerprint::with_shape(existing, &existing_shape)
        .is_none_or(|existing| existing != desired_fingerprint))
}

pub(crate) fn unknown_shape(object: &DynamicObject) -> ReplicationError {
    ReplicationError::UnknownContentShape {
        kind: object
            .types
            .as_ref()
            .map(|t| t.kind.clone())
            .unwrap_or_default(),
        namespace: object.metadata.namespace.clone().unwrap_or_default(),
        name: object.metadata.name.clone().unwrap_or_default(),
    }
}

fn metadata_hash(map: Option<&BTreeMap<String, String>>) -> String {
    let object: Map<String, Value> = map
        .into_iter()
        .flatten()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    fingerprint_value(&Value::Object(object))
}

fn encode_string_data(body: &Value) -> Value {
    match body {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), Value::String(STANDARD.encode(scalar_text(v)))))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
