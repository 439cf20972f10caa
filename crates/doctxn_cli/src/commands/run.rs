//! Run command implementation.
//!
//! Executes a script of command documents, one JSON object per line, on a
//! single connection and prints one JSON reply per command. Failed commands
//! print `{"ok":0,"errmsg":...}` and the script continues.

use crate::commands::json::{self, JsonError};
use doctxn_core::{Command, CoreError, Database, Document, Filter, IndexSpec, Session, Value};
use serde_json::{json, Value as Json};
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Why a script line failed.
#[derive(Debug, Error)]
pub enum ScriptError {
    /// The database rejected the command.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The line is not valid JSON.
    #[error("invalid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    /// The JSON has no document equivalent.
    #[error(transparent)]
    Json(#[from] JsonError),

    /// The command document is malformed or unknown.
    #[error("{0}")]
    BadCommand(String),
}

impl ScriptError {
    fn code(&self) -> i32 {
        match self {
            Self::Core(err) => err.code(),
            Self::BadCommand(_) => 59,
            Self::Parse(_) | Self::Json(_) => 9,
        }
    }

    /// Error reply document.
    #[must_use]
    pub fn to_reply(&self) -> Json {
        json!({"ok": 0, "errmsg": self.to_string(), "code": self.code()})
    }
}

/// Runs the run command.
pub fn run(path: Option<&Path>, script: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let text = fs::read_to_string(script)?;
    let db = match path {
        Some(path) => Database::open(path)?,
        None => Database::open_in_memory(),
    };
    let mut session = db.connect()?;

    for reply in run_script(&mut session, &text) {
        println!("{}", serde_json::to_string(&reply)?);
    }

    drop(session);
    db.close()?;
    Ok(())
}

/// Executes every non-blank line that does not start with `//` and returns
/// the replies in order.
pub fn run_script(session: &mut Session, text: &str) -> Vec<Json> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("//"))
        .map(|line| run_line(session, line).unwrap_or_else(|err| err.to_reply()))
        .collect()
}

fn run_line(session: &mut Session, line: &str) -> Result<Json, ScriptError> {
    let parsed: Json = serde_json::from_str(line)?;
    let doc = json::to_document(&parsed)?;
    dispatch(session, &doc)
}

/// Executes one command document.
pub fn dispatch(session: &mut Session, cmd: &Document) -> Result<Json, ScriptError> {
    if let Some(command) = Command::from_document(cmd) {
        let reply = session.execute(command)?;
        return Ok(serde_json::to_value(reply)?);
    }

    let (name, target) = cmd
        .iter()
        .next()
        .ok_or_else(|| ScriptError::BadCommand("empty command document".into()))?;
    debug!(command = name, "dispatching");

    match name {
        "insert" => {
            let collection = collection_of(name, target)?;
            let docs = cmd
                .get("documents")
                .and_then(Value::as_array)
                .ok_or_else(|| ScriptError::BadCommand("insert needs a documents array".into()))?;
            let mut ids = Vec::with_capacity(docs.len());
            for doc in docs {
                let doc = doc.as_document().ok_or_else(|| {
                    ScriptError::BadCommand("insert documents must be objects".into())
                })?;
                ids.push(json::from_value(&session.insert(collection, doc.clone())?));
            }
            Ok(json!({"ok": 1, "n": ids.len(), "insertedIds": ids}))
        }
        "find" => {
            let collection = collection_of(name, target)?;
            let docs = session.find(collection, &filter_of(cmd)?)?;
            let docs: Vec<Json> = docs.iter().map(json::from_document).collect();
            Ok(json!({"ok": 1, "documents": docs}))
        }
        "count" => {
            let collection = collection_of(name, target)?;
            let n = session.count_matching(collection, &filter_of(cmd)?)?;
            Ok(json!({"ok": 1, "n": n}))
        }
        "delete" => {
            let collection = collection_of(name, target)?;
            let filter = filter_of(cmd)?;
            let just_one = cmd.get("justOne").and_then(Value::as_bool).unwrap_or(false);
            let n = if just_one {
                session.delete_one(collection, filter)?
            } else {
                session.delete_many(collection, filter)?
            };
            Ok(json!({"ok": 1, "n": n}))
        }
        "createIndexes" => {
            let collection = collection_of(name, target)?;
            let key = cmd
                .get("key")
                .and_then(Value::as_document)
                .ok_or_else(|| ScriptError::BadCommand("createIndexes needs a key".into()))?;
            let mut spec = IndexSpec::from_key_document(key)?;
            if let Some(index_name) = cmd.get("name").and_then(Value::as_text) {
                spec = spec.named(index_name);
            }
            if cmd.get("unique").and_then(Value::as_bool).unwrap_or(false) {
                spec = spec.unique();
            }
            let created = session.create_index(collection, spec)?;
            Ok(json!({"ok": 1, "created": created}))
        }
        "dropIndex" => {
            let collection = collection_of(name, target)?;
            let index_name = cmd
                .get("name")
                .and_then(Value::as_text)
                .ok_or_else(|| ScriptError::BadCommand("dropIndex needs a name".into()))?;
            session.drop_index(collection, index_name)?;
            Ok(json!({"ok": 1}))
        }
        "drop" => {
            let collection = collection_of(name, target)?;
            let dropped = session.drop_collection(collection)?;
            Ok(json!({"ok": 1, "dropped": dropped}))
        }
        "listIndexes" => {
            let collection = collection_of(name, target)?;
            let indexes: Vec<Json> = session
                .list_indexes(collection)?
                .iter()
                .map(|spec| json::from_document(&spec.to_document()))
                .collect();
            Ok(json!({"ok": 1, "indexes": indexes}))
        }
        "listCollections" => Ok(json!({"ok": 1, "collections": session.collection_names()?})),
        other => Err(ScriptError::BadCommand(format!("no such command: '{other}'"))),
    }
}

fn collection_of<'a>(command: &str, target: &'a Value) -> Result<&'a str, ScriptError> {
    target
        .as_text()
        .ok_or_else(|| ScriptError::BadCommand(format!("{command} needs a collection name")))
}

fn filter_of(cmd: &Document) -> Result<Filter, ScriptError> {
    match cmd.get("filter") {
        None | Some(Value::Null) => Ok(Filter::all()),
        Some(Value::Document(doc)) => Ok(Filter::from_document(doc.clone())?),
        Some(other) => Err(ScriptError::BadCommand(format!(
            "filter must be an object, got {}",
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn replies(script: &str) -> Vec<Json> {
        let db = Database::open_in_memory();
        let mut session = db.connect().unwrap();
        run_script(&mut session, script)
    }

    #[test]
    fn rollback_scenario() {
        let out = replies(
            r#"
            {"drop": "jstests_txn_basic"}
            {"insert": "jstests_txn_basic", "documents": [{"a": "before"}]}
            {"beginTransaction": 1}
            {"insert": "jstests_txn_basic", "documents": [{"a": "during"}]}
            {"count": "jstests_txn_basic"}
            {"rollbackTransaction": 1}
            {"count": "jstests_txn_basic"}
            "#,
        );
        assert_eq!(out[2], json!({"ok": 1, "status": "transaction began"}));
        assert_eq!(out[4]["n"], json!(2));
        assert_eq!(out[5], json!({"ok": 1, "status": "transaction rolled back"}));
        assert_eq!(out[6]["n"], json!(1));
    }

    #[test]
    fn errors_are_reported_and_script_continues() {
        let out = replies(
            r#"
            // nothing open yet
            {"commitTransaction": 1}
            {"beginTransaction": 1}
            {"beginTransaction": 1}
            {"frobnicate": "c"}
            not json
            {"rollbackTransaction": 1}
            "#,
        );
        assert_eq!(out.len(), 6);
        assert_eq!(out[0]["ok"], json!(0));
        assert_eq!(out[1]["ok"], json!(1));
        assert_eq!(out[2]["ok"], json!(0));
        assert!(out[3]["errmsg"].as_str().unwrap().contains("frobnicate"));
        assert_eq!(out[4]["ok"], json!(0));
        assert_eq!(out[5]["status"], json!("transaction rolled back"));
    }

    #[test]
    fn find_returns_documents_in_order() {
        let out = replies(
            r#"
            {"insert": "c", "documents": [{"_id": 1, "a": "before"}]}
            {"beginTransaction": 1}
            {"insert": "c", "documents": [{"_id": 2, "a": "during"}]}
            {"find": "c", "filter": {}}
            {"commitTransaction": 1}
            {"find": "c", "filter": {"a": "during"}}
            "#,
        );
        assert_eq!(out[3]["documents"][1], json!({"_id": 2, "a": "during"}));
        assert_eq!(out[5]["documents"], json!([{"_id": 2, "a": "during"}]));
    }

    #[test]
    fn index_commands() {
        let out = replies(
            r#"
            {"createIndexes": "c", "key": {"a": 1, "b": -1}, "unique": true}
            {"listIndexes": "c"}
            {"createIndexes": "c", "key": {"a": 1, "b": -1}, "unique": true}
            {"dropIndex": "c", "name": "a_1_b_-1"}
            {"dropIndex": "c", "name": "_id_"}
            "#,
        );
        assert_eq!(out[0]["created"], json!(true));
        assert_eq!(out[1]["indexes"][1]["name"], json!("a_1_b_-1"));
        assert_eq!(out[2]["created"], json!(false));
        assert_eq!(out[3], json!({"ok": 1}));
        assert_eq!(out[4]["ok"], json!(0));
    }

    #[test]
    fn duplicate_key_reports_its_code() {
        let out = replies(
            r#"
            {"insert": "c", "documents": [{"_id": 1}]}
            {"insert": "c", "documents": [{"_id": 1}]}
            "#,
        );
        assert_eq!(out[1]["code"], json!(11000));
    }
}
