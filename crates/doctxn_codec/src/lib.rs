//! # DocTxn Codec
//!
//! The document value model shared by every DocTxn crate, plus its binary
//! encoding.
//!
//! - [`Value`] is a dynamically typed document value. Floats are not
//!   supported, which keeps values totally ordered and usable as index keys.
//! - [`Document`] is an ordered list of named fields. Field order is kept
//!   exactly as written.
//! - [`to_cbor`] / [`from_cbor`] encode a document to CBOR through
//!   `ciborium`; the journal stores mutations this way.
//!
//! ```
//! use doctxn_codec::{from_cbor, to_cbor, Document, Value};
//!
//! let doc = Document::new().with("a", "inserted during transaction");
//! let bytes = to_cbor(&Value::Document(doc.clone())).unwrap();
//! assert_eq!(from_cbor(&bytes).unwrap(), Value::Document(doc));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cbor;
mod document;
mod error;
mod value;

pub use cbor::{from_cbor, to_cbor};
pub use document::Document;
pub use error::{CodecError, CodecResult};
pub use value::Value;
