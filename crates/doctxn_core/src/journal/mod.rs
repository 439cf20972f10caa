//! Commit journal for durable databases.
//!
//! Every committed batch is written as one contiguous run of records and
//! flushed before the batch is published:
//!
//! ```text
//! Begin{txid} | Mutation{txid, cbor}* | Commit{txid, sequence}
//! ```
//!
//! Each record uses the envelope
//!
//! ```text
//! | magic (4) | version (2) | type (1) | length (4) | payload (N) | crc32 (4) |
//! ```
//!
//! ## Recovery
//!
//! - A short header or payload at the end of the file is a torn write. It is
//!   cut off and recovery continues with the batches before it.
//! - Records of a transaction with no commit record are discarded.
//! - A checksum mismatch, bad magic, unknown record type or newer version
//!   aborts open.

mod record;
mod writer;

pub use record::{JournalRecord, JournalRecordType, JOURNAL_MAGIC, JOURNAL_VERSION};
pub use writer::{CommittedBatch, Journal, JournalScan};
