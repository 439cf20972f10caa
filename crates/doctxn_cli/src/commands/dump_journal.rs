//! Dump journal command implementation.

use doctxn_core::{DatabaseDir, Journal, JournalRecord, JournalScan};
use doctxn_storage::FileBackend;
use serde::Serialize;
use std::path::Path;

/// Journal record representation for output.
#[derive(Debug, Serialize)]
pub struct JournalRecordInfo {
    /// Offset in the journal file.
    pub offset: u64,
    /// Record type.
    pub record_type: &'static str,
    /// Transaction ID.
    pub txid: u64,
    /// Commit sequence (commit records only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
    /// Mutation kind (mutation records only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub op: Option<&'static str>,
    /// Target collection (mutation records only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
}

impl From<&(u64, JournalRecord)> for JournalRecordInfo {
    fn from((offset, record): &(u64, JournalRecord)) -> Self {
        let mut info = Self {
            offset: *offset,
            record_type: "BEGIN",
            txid: record.txid().as_u64(),
            sequence: None,
            op: None,
            collection: None,
        };
        match record {
            JournalRecord::Begin { .. } => {}
            JournalRecord::Mutation { mutation, .. } => {
                info.record_type = "MUTATION";
                info.op = Some(mutation.op_name());
                info.collection = Some(mutation.collection().to_string());
            }
            JournalRecord::Commit { sequence, .. } => {
                info.record_type = "COMMIT";
                info.sequence = Some(sequence.as_u64());
            }
        }
        info
    }
}

/// Journal dump output.
#[derive(Debug, Serialize)]
pub struct JournalDump {
    /// Decoded records, up to the limit.
    pub records: Vec<JournalRecordInfo>,
    /// Bytes holding complete records.
    pub valid_len: u64,
    /// Journal file size.
    pub total_len: u64,
    /// Batches that reached their commit record.
    pub committed_batches: usize,
}

/// Runs the dump-journal command.
pub fn run(path: &Path, limit: Option<usize>, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let dir = DatabaseDir::open(path, false)?;
    let journal_path = dir.journal_path();
    if !journal_path.exists() {
        return Err("Journal file not found".into());
    }

    let backend = FileBackend::open(&journal_path)?;
    let scan = Journal::new(Box::new(backend), false).scan()?;
    let dump = summarize(&scan, limit);

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&dump)?),
        _ => print_text_output(&dump),
    }
    Ok(())
}

/// Builds the dump from a scan, keeping at most `limit` records.
pub fn summarize(scan: &JournalScan, limit: Option<usize>) -> JournalDump {
    JournalDump {
        records: scan
            .records
            .iter()
            .take(limit.unwrap_or(usize::MAX))
            .map(JournalRecordInfo::from)
            .collect(),
        valid_len: scan.valid_len,
        total_len: scan.total_len,
        committed_batches: scan.committed_batches().len(),
    }
}

fn print_text_output(dump: &JournalDump) {
    println!(
        "{:>10}  {:<8}  {:>8}  {:>8}  DETAILS",
        "OFFSET", "TYPE", "TXID", "SEQ"
    );
    println!("{}", "-".repeat(60));

    for record in &dump.records {
        let seq = record
            .sequence
            .map_or_else(|| "-".to_string(), |s| s.to_string());
        let details = match (&record.op, &record.collection) {
            (Some(op), Some(ns)) => format!("{op} {ns}"),
            _ => String::new(),
        };
        println!(
            "{:>10}  {:<8}  {:>8}  {:>8}  {}",
            record.offset, record.record_type, record.txid, seq, details
        );
    }

    println!();
    println!(
        "{} records, {} committed batches",
        dump.records.len(),
        dump.committed_batches
    );
    if dump.valid_len < dump.total_len {
        println!(
            "torn tail: {} bytes after offset {} will be discarded on open",
            dump.total_len - dump.valid_len,
            dump.valid_len
        );
    }
}
