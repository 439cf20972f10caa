//! Journal records and their envelope.

use crate::error::{CoreError, CoreResult};
use crate::transaction::Mutation;
use crate::types::{SequenceNumber, TransactionId};

/// Magic bytes at the start of every record.
pub const JOURNAL_MAGIC: [u8; 4] = *b"DTXJ";

/// Current record format version.
pub const JOURNAL_VERSION: u16 = 1;

/// magic (4) + version (2) + type (1) + length (4)
pub(crate) const HEADER_SIZE: usize = 11;

pub(crate) const CRC_SIZE: usize = 4;

/// Record type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum JournalRecordType {
    /// Start of a committed batch.
    Begin = 1,
    /// One mutation of the batch.
    Mutation = 2,
    /// End of the batch.
    Commit = 3,
}

impl JournalRecordType {
    /// Parses a type byte.
    #[must_use]
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Begin),
            2 => Some(Self::Mutation),
            3 => Some(Self::Commit),
            _ => None,
        }
    }

    /// The type byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// A decoded journal record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalRecord {
    /// Opens a batch.
    Begin {
        /// Committing transaction.
        txid: TransactionId,
    },
    /// A mutation in issuance order.
    Mutation {
        /// Committing transaction.
        txid: TransactionId,
        /// The staged write.
        mutation: Mutation,
    },
    /// Closes a batch.
    Commit {
        /// Committing transaction.
        txid: TransactionId,
        /// Sequence assigned to the batch.
        sequence: SequenceNumber,
    },
}

impl JournalRecord {
    /// The record's type tag.
    #[must_use]
    pub fn record_type(&self) -> JournalRecordType {
        match self {
            Self::Begin { .. } => JournalRecordType::Begin,
            Self::Mutation { .. } => JournalRecordType::Mutation,
            Self::Commit { .. } => JournalRecordType::Commit,
        }
    }

    /// The owning transaction.
    #[must_use]
    pub fn txid(&self) -> TransactionId {
        match self {
            Self::Begin { txid } | Self::Mutation { txid, .. } | Self::Commit { txid, .. } => *txid,
        }
    }

    fn encode_payload(&self) -> CoreResult<Vec<u8>> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&self.txid().as_u64().to_le_bytes());
        match self {
            Self::Begin { .. } => {}
            Self::Mutation { mutation, .. } => buf.extend_from_slice(&mutation.encode()?),
            Self::Commit { sequence, .. } => {
                buf.extend_from_slice(&sequence.as_u64().to_le_bytes());
            }
        }
        Ok(buf)
    }

    fn decode_payload(record_type: JournalRecordType, payload: &[u8]) -> CoreResult<Self> {
        let (txid, rest) = split_u64(payload)?;
        let txid = TransactionId::new(txid);
        match record_type {
            JournalRecordType::Begin => {
                expect_empty(rest, "Begin")?;
                Ok(Self::Begin { txid })
            }
            JournalRecordType::Mutation => Ok(Self::Mutation {
                txid,
                mutation: Mutation::decode(rest)?,
            }),
            JournalRecordType::Commit => {
                let (sequence, rest) = split_u64(rest)?;
                expect_empty(rest, "Commit")?;
                Ok(Self::Commit {
                    txid,
                    sequence: SequenceNumber::new(sequence),
                })
            }
        }
    }

    /// Serializes the record with its envelope and appends it to `out`.
    ///
    /// # Errors
    ///
    /// Returns an error if the mutation cannot be encoded or the payload
    /// does not fit the 4-byte length field.
    pub fn encode_into(&self, out: &mut Vec<u8>) -> CoreResult<()> {
        let payload = self.encode_payload()?;
        let len = u32::try_from(payload.len())
            .map_err(|_| CoreError::invalid_operation("journal record payload too large"))?;

        let start = out.len();
        out.extend_from_slice(&JOURNAL_MAGIC);
        out.extend_from_slice(&JOURNAL_VERSION.to_le_bytes());
        out.push(self.record_type().as_byte());
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(&payload);
        let crc = crc32fast::hash(&out[start..]);
        out.extend_from_slice(&crc.to_le_bytes());
        Ok(())
    }

    /// Parses one record starting at `bytes[0]`.
    ///
    /// Returns `Ok(None)` when `bytes` ends before the record does, and
    /// otherwise the record with its total encoded length. `offset` is only
    /// used for error messages.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ChecksumMismatch`] or
    /// [`CoreError::JournalCorruption`] for damaged records.
    pub fn decode_from(bytes: &[u8], offset: u64) -> CoreResult<Option<(Self, usize)>> {
        if bytes.len() < HEADER_SIZE {
            return Ok(None);
        }
        if bytes[0..4] != JOURNAL_MAGIC {
            return Err(CoreError::journal_corruption(format!(
                "bad magic at offset {offset}"
            )));
        }
        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version > JOURNAL_VERSION {
            return Err(CoreError::journal_corruption(format!(
                "unsupported journal version {version} at offset {offset}"
            )));
        }
        let record_type = JournalRecordType::from_byte(bytes[6]).ok_or_else(|| {
            CoreError::journal_corruption(format!(
                "unknown record type {} at offset {offset}",
                bytes[6]
            ))
        })?;
        let len = u32::from_le_bytes([bytes[7], bytes[8], bytes[9], bytes[10]]) as usize;

        let total = HEADER_SIZE + len + CRC_SIZE;
        if bytes.len() < total {
            return Ok(None);
        }
        let body_end = HEADER_SIZE + len;
        let expected = u32::from_le_bytes([
            bytes[body_end],
            bytes[body_end + 1],
            bytes[body_end + 2],
            bytes[body_end + 3],
        ]);
        let actual = crc32fast::hash(&bytes[..body_end]);
        if expected != actual {
            return Err(CoreError::ChecksumMismatch {
                offset,
                expected,
                actual,
            });
        }

        let record = Self::decode_payload(record_type, &bytes[HEADER_SIZE..body_end])?;
        Ok(Some((record, total)))
    }
}

fn split_u64(payload: &[u8]) -> CoreResult<(u64, &[u8])> {
    if payload.len() < 8 {
        return Err(CoreError::journal_corruption("unexpected end of payload"));
    }
    let (head, rest) = payload.split_at(8);
    let mut raw = [0u8; 8];
    raw.copy_from_slice(head);
    Ok((u64::from_le_bytes(raw), rest))
}

fn expect_empty(rest: &[u8], kind: &str) -> CoreResult<()> {
    if rest.is_empty() {
        Ok(())
    } else {
        Err(CoreError::journal_corruption(format!(
            "{} trailing bytes in {kind} record",
            rest.len()
        )))
    }
}
