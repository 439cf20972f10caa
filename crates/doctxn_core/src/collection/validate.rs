//! Checks run on names and documents before a mutation is accepted.

use crate::error::{CoreError, CoreResult};
use doctxn_codec::{Document, Value};
use uuid::Uuid;

const MAX_COLLECTION_NAME_LEN: usize = 120;

/// Validates a collection name.
///
/// # Errors
///
/// Returns [`CoreError::InvalidCollectionName`] for empty or over-long
/// names, names containing `$` or NUL, and the reserved `system.` prefix.
pub fn validate_collection_name(name: &str) -> CoreResult<()> {
    if name.is_empty() {
        return Err(CoreError::invalid_collection_name(name, "name is empty"));
    }
    if name.len() > MAX_COLLECTION_NAME_LEN {
        return Err(CoreError::invalid_collection_name(
            name,
            format!("name is longer than {MAX_COLLECTION_NAME_LEN} bytes"),
        ));
    }
    if name.contains('$') || name.contains('\0') {
        return Err(CoreError::invalid_collection_name(
            name,
            "name contains '$' or NUL",
        ));
    }
    if name.starts_with("system.") {
        return Err(CoreError::invalid_collection_name(
            name,
            "the system. prefix is reserved",
        ));
    }
    Ok(())
}

/// Validates a document for storage.
///
/// # Errors
///
/// Returns [`CoreError::InvalidDocument`] for empty, `$`-prefixed or dotted
/// field names, NUL bytes in names, an array `_id`, or nesting deeper than
/// `max_depth`.
pub fn validate_document(doc: &Document, max_depth: usize) -> CoreResult<()> {
    if let Some(Value::Array(_)) = doc.get("_id") {
        return Err(CoreError::invalid_document("_id cannot be an array"));
    }
    check_fields(doc, 1, max_depth)
}

fn check_fields(doc: &Document, depth: usize, max_depth: usize) -> CoreResult<()> {
    if depth > max_depth {
        return Err(CoreError::invalid_document(format!(
            "nesting exceeds {max_depth} levels"
        )));
    }
    for (name, value) in doc.iter() {
        if name.is_empty() {
            return Err(CoreError::invalid_document("empty field name"));
        }
        if name.starts_with('$') {
            return Err(CoreError::invalid_document(format!(
                "field name {name} starts with '$'"
            )));
        }
        if name.contains('.') || name.contains('\0') {
            return Err(CoreError::invalid_document(format!(
                "field name {name:?} contains '.' or NUL"
            )));
        }
        check_value(value, depth, max_depth)?;
    }
    Ok(())
}

fn check_value(value: &Value, depth: usize, max_depth: usize) -> CoreResult<()> {
    match value {
        Value::Document(inner) => check_fields(inner, depth + 1, max_depth),
        Value::Array(items) => {
            if depth + 1 > max_depth {
                return Err(CoreError::invalid_document(format!(
                    "nesting exceeds {max_depth} levels"
                )));
            }
            items
                .iter()
                .try_for_each(|item| check_value(item, depth + 1, max_depth))
        }
        _ => Ok(()),
    }
}

/// Ensures the document has an `_id` as its first field, generating a UUID
/// string when absent. Returns the `_id`.
pub fn assign_id(doc: &mut Document) -> Value {
    let id = doc
        .remove("_id")
        .unwrap_or_else(|| Value::Text(Uuid::new_v4().to_string()));
    doc.insert_first("_id", id.clone());
    id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_names() {
        assert!(validate_collection_name("jstests_txn_basic").is_ok());
        assert!(validate_collection_name("").is_err());
        assert!(validate_collection_name("a$b").is_err());
        assert!(validate_collection_name("system.indexes").is_err());
        assert!(validate_collection_name(&"x".repeat(121)).is_err());
    }

    #[test]
    fn field_names() {
        assert!(validate_document(&Document::new().with("a", 1), 10).is_ok());
        assert!(validate_document(&Document::new().with("$set", 1), 10).is_err());
        assert!(validate_document(&Document::new().with("a.b", 1), 10).is_err());
        assert!(validate_document(&Document::new().with("", 1), 10).is_err());
        let nested_bad = Document::new().with("a", Document::new().with("$x", 1));
        assert!(validate_document(&nested_bad, 10).is_err());
    }

    #[test]
    fn array_id_rejected() {
        let doc = Document::new().with("_id", Value::Array(vec![]));
        assert!(validate_document(&doc, 10).is_err());
    }

    #[test]
    fn depth_limit() {
        let mut doc = Document::new().with("leaf", 1);
        for _ in 0..4 {
            doc = Document::new().with("n", doc);
        }
        assert!(validate_document(&doc, 5).is_ok());
        assert!(validate_document(&doc, 4).is_err());
    }

    #[test]
    fn assign_id_generates_and_moves_first() {
        let mut doc = Document::new().with("a", 1);
        let id = assign_id(&mut doc);
        assert!(id.as_text().is_some());
        assert_eq!(doc.iter().next().map(|(k, _)| k), Some("_id"));

        let mut given = Document::new().with("a", 1).with("_id", 42);
        assert_eq!(assign_id(&mut given), Value::Integer(42));
        assert_eq!(given.iter().next(), Some(("_id", &Value::Integer(42))));
    }
}
