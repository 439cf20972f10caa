//! Equality filters for find, count and delete.

use crate::error::{CoreError, CoreResult};
use doctxn_codec::{Document, Value};

/// A conjunction of `path == value` conditions.
///
/// An empty filter matches every document. A condition on `null` also
/// matches documents where the path is missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    conditions: Document,
}

impl Filter {
    /// A filter that matches everything.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// A single equality condition.
    #[must_use]
    pub fn eq(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::all().and_eq(path, value)
    }

    /// Adds another equality condition.
    #[must_use]
    pub fn and_eq(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.insert(path, value);
        self
    }

    /// Builds a filter from a query document such as `{a: "during"}`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidQuery`] for operator expressions (`$gt`,
    /// `$or`, ...), which this store does not evaluate.
    pub fn from_document(doc: Document) -> CoreResult<Self> {
        for (path, value) in doc.iter() {
            if path.starts_with('$') {
                return Err(CoreError::invalid_query(format!(
                    "unsupported top-level operator {path}"
                )));
            }
            if let Value::Document(inner) = value {
                if let Some((op, _)) = inner.iter().find(|(k, _)| k.starts_with('$')) {
                    return Err(CoreError::invalid_query(format!(
                        "unsupported operator {op} on {path}"
                    )));
                }
            }
        }
        Ok(Self { conditions: doc })
    }

    /// Returns the conditions as a document.
    #[must_use]
    pub fn as_document(&self) -> &Document {
        &self.conditions
    }

    /// Returns true if there are no conditions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Iterates `(path, value)` conditions.
    pub fn conditions(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.conditions.iter()
    }

    /// Evaluates the filter against a document.
    #[must_use]
    pub fn matches(&self, doc: &Document) -> bool {
        self.conditions
            .iter()
            .all(|(path, expected)| match doc.get_path(path) {
                Some(actual) => actual == expected,
                None => expected.is_null(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_filter_matches_all() {
        assert!(Filter::all().matches(&Document::new()));
        assert!(Filter::all().matches(&Document::new().with("a", 1)));
    }

    #[test]
    fn equality_on_dotted_path() {
        let doc = Document::new().with("a", Document::new().with("b", "x"));
        assert!(Filter::eq("a.b", "x").matches(&doc));
        assert!(!Filter::eq("a.b", "y").matches(&doc));
    }

    #[test]
    fn null_matches_missing() {
        let doc = Document::new().with("a", 1);
        assert!(Filter::eq("b", Value::Null).matches(&doc));
        assert!(!Filter::eq("a", Value::Null).matches(&doc));
    }

    #[test]
    fn conditions_are_conjunctive() {
        let doc = Document::new().with("a", 1).with("b", 2);
        assert!(Filter::eq("a", 1).and_eq("b", 2).matches(&doc));
        assert!(!Filter::eq("a", 1).and_eq("b", 3).matches(&doc));
    }

    #[test]
    fn operators_are_rejected() {
        let op = Document::new().with("a", Document::new().with("$gt", 1));
        assert!(matches!(
            Filter::from_document(op),
            Err(CoreError::InvalidQuery { .. })
        ));
        let top = Document::new().with("$or", Value::Array(vec![]));
        assert!(Filter::from_document(top).is_err());
    }
}
