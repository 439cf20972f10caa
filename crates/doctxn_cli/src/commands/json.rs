//! Conversion between JSON and document values.
//!
//! Object key order is preserved in both directions, so key patterns such
//! as `{"a": 1, "b": -1}` keep their meaning.

use doctxn_codec::{Document, Value};
use serde_json::{Map, Number, Value as Json};
use thiserror::Error;

/// JSON that has no document equivalent.
#[derive(Debug, Error)]
pub enum JsonError {
    /// Only integers in the i64 range are supported.
    #[error("unsupported number {0}: only 64-bit integers are allowed")]
    Number(Number),

    /// A document was required.
    #[error("expected an object, got {0}")]
    NotAnObject(&'static str),
}

/// Converts a JSON value.
pub fn to_value(json: &Json) -> Result<Value, JsonError> {
    Ok(match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => Value::Integer(n.as_i64().ok_or_else(|| JsonError::Number(n.clone()))?),
        Json::String(s) => Value::Text(s.clone()),
        Json::Array(items) => Value::Array(items.iter().map(to_value).collect::<Result<_, _>>()?),
        Json::Object(map) => Value::Document(object_to_document(map)?),
    })
}

/// Converts a JSON object.
pub fn to_document(json: &Json) -> Result<Document, JsonError> {
    match json {
        Json::Object(map) => object_to_document(map),
        other => Err(JsonError::NotAnObject(json_type(other))),
    }
}

fn object_to_document(map: &Map<String, Json>) -> Result<Document, JsonError> {
    map.iter()
        .map(|(k, v)| to_value(v).map(|value| (k.clone(), value)))
        .collect()
}

/// Converts a value to JSON. Byte strings become lowercase hex.
#[must_use]
pub fn from_value(value: &Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Integer(i) => Json::Number((*i).into()),
        Value::Text(s) => Json::String(s.clone()),
        Value::Bytes(bytes) => Json::String(bytes.iter().map(|b| format!("{b:02x}")).collect()),
        Value::Array(items) => Json::Array(items.iter().map(from_value).collect()),
        Value::Document(doc) => from_document(doc),
    }
}

/// Converts a document to a JSON object.
#[must_use]
pub fn from_document(doc: &Document) -> Json {
    Json::Object(
        doc.iter()
            .map(|(k, v)| (k.to_string(), from_value(v)))
            .collect(),
    )
}

fn json_type(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "bool",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}
