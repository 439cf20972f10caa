//! Inspect command implementation.

use doctxn_core::Database;
use serde::Serialize;
use std::path::Path;

/// Database inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Database path.
    pub path: String,
    /// Storage engine name.
    pub engine: &'static str,
    /// Journal size in bytes.
    pub journal_size: u64,
    /// Sequence of the latest commit.
    pub sequence: u64,
    /// Per-collection statistics.
    pub collections: Vec<CollectionStats>,
}

/// Statistics for a single collection.
#[derive(Debug, Serialize)]
pub struct CollectionStats {
    /// Collection name.
    pub name: String,
    /// Number of documents.
    pub document_count: usize,
    /// Indexes in creation order.
    pub indexes: Vec<IndexStats>,
}

/// Statistics for a single index.
#[derive(Debug, Serialize)]
pub struct IndexStats {
    /// Index name.
    pub name: String,
    /// Key fields and directions.
    pub keys: Vec<(String, i32)>,
    /// Whether keys must be unique.
    pub unique: bool,
    /// Distinct keys held.
    pub key_count: usize,
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    if !path.join("journal.log").exists() {
        return Err(format!("No database found at {}", path.display()).into());
    }

    let db = Database::open(path)?;
    let result = inspect(&db, path);
    db.close()?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => print_text_output(&result),
    }
    Ok(())
}

/// Collects the committed state of an open database.
pub fn inspect(db: &Database, path: &Path) -> InspectResult {
    let snapshot = db.snapshot();
    let read = snapshot.read();
    let collections = read
        .collections()
        .map(|coll| CollectionStats {
            name: coll.name().to_string(),
            document_count: coll.len(),
            indexes: coll
                .indexes()
                .map(|spec| IndexStats {
                    name: spec.name().to_string(),
                    keys: spec.keys().to_vec(),
                    unique: spec.is_unique(),
                    key_count: coll.index_key_count(spec.name()).unwrap_or(0),
                })
                .collect(),
        })
        .collect();

    InspectResult {
        path: path.display().to_string(),
        engine: db.engine_name(),
        journal_size: db.journal_size().unwrap_or(0),
        sequence: read.sequence().as_u64(),
        collections,
    }
}

fn print_text_output(result: &InspectResult) {
    println!("DocTxn Database Inspection");
    println!("==========================");
    println!();
    println!("Path:     {}", result.path);
    println!("Engine:   {}", result.engine);
    println!("Journal:  {} bytes", format_size(result.journal_size));
    println!("Sequence: {}", result.sequence);
    println!();
    println!("Collections:");
    if result.collections.is_empty() {
        println!("  (none)");
    }
    for coll in &result.collections {
        println!("  {} ({} documents)", coll.name, coll.document_count);
        for index in &coll.indexes {
            let keys = index
                .keys
                .iter()
                .map(|(field, dir)| format!("{field}: {dir}"))
                .collect::<Vec<_>>()
                .join(", ");
            println!(
                "    {} {{{keys}}}{} {} keys",
                index.name,
                if index.unique { " unique" } else { "" },
                index.key_count
            );
        }
    }
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes}")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
