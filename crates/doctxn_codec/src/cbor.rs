//! CBOR encoding through `ciborium`.
//!
//! Documents become CBOR maps with text keys in field order, so a decoded
//! document compares equal to the one that was encoded.

use crate::document::Document;
use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use ciborium::value::{Integer, Value as Cbor};

/// Encodes a value to CBOR bytes.
///
/// # Errors
///
/// Returns an error if the CBOR writer fails.
pub fn to_cbor(value: &Value) -> CodecResult<Vec<u8>> {
    let mut out = Vec::new();
    ciborium::into_writer(&lower(value), &mut out)
        .map_err(|e| CodecError::encoding_failed(e.to_string()))?;
    Ok(out)
}

/// Decodes a value from CBOR bytes.
///
/// Tags are unwrapped and their inner value decoded.
///
/// # Errors
///
/// Returns an error if the bytes are not CBOR, or use floats, integers
/// outside `i64`, or non-text map keys.
pub fn from_cbor(bytes: &[u8]) -> CodecResult<Value> {
    let cbor: Cbor =
        ciborium::from_reader(bytes).map_err(|e| CodecError::decoding_failed(e.to_string()))?;
    lift(cbor)
}

fn lower(value: &Value) -> Cbor {
    match value {
        Value::Null => Cbor::Null,
        Value::Bool(b) => Cbor::Bool(*b),
        Value::Integer(n) => Cbor::Integer(Integer::from(*n)),
        Value::Text(s) => Cbor::Text(s.clone()),
        Value::Bytes(b) => Cbor::Bytes(b.clone()),
        Value::Array(items) => Cbor::Array(items.iter().map(lower).collect()),
        Value::Document(doc) => Cbor::Map(
            doc.iter()
                .map(|(k, v)| (Cbor::Text(k.to_string()), lower(v)))
                .collect(),
        ),
    }
}

fn lift(cbor: Cbor) -> CodecResult<Value> {
    Ok(match cbor {
        Cbor::Null => Value::Null,
        Cbor::Bool(b) => Value::Bool(b),
        Cbor::Integer(n) => Value::Integer(i64::try_from(n).map_err(|_| CodecError::IntegerOverflow)?),
        Cbor::Text(s) => Value::Text(s),
        Cbor::Bytes(b) => Value::Bytes(b),
        Cbor::Float(_) => return Err(CodecError::FloatForbidden),
        Cbor::Tag(_, inner) => lift(*inner)?,
        Cbor::Array(items) => Value::Array(items.into_iter().map(lift).collect::<CodecResult<_>>()?),
        Cbor::Map(entries) => {
            let mut doc = Document::new();
            for (k, v) in entries {
                let Cbor::Text(name) = k else {
                    return Err(CodecError::NonTextFieldName);
                };
                doc.insert(name, lift(v)?);
            }
            Value::Document(doc)
        }
        other => {
            return Err(CodecError::decoding_failed(format!(
                "unsupported CBOR item: {other:?}"
            )))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn nested_document_roundtrip() {
        let doc = Document::new()
            .with("_id", "6f1c")
            .with("a", "inserted before transaction create")
            .with("tags", Value::Array(vec![Value::from(1), Value::Null, Value::from(true)]))
            .with("meta", Document::new().with("z", 1).with("b", Value::Bytes(vec![0, 1])));
        let value = Value::Document(doc);
        let bytes = to_cbor(&value).unwrap();
        assert_eq!(from_cbor(&bytes).unwrap(), value);
    }

    #[test]
    fn float_is_rejected() {
        let mut bytes = Vec::new();
        ciborium::into_writer(&Cbor::Float(1.5), &mut bytes).unwrap();
        assert_eq!(from_cbor(&bytes), Err(CodecError::FloatForbidden));
    }

    #[test]
    fn integer_key_is_rejected() {
        let mut bytes = Vec::new();
        let map = Cbor::Map(vec![(Cbor::Integer(1.into()), Cbor::Null)]);
        ciborium::into_writer(&map, &mut bytes).unwrap();
        assert_eq!(from_cbor(&bytes), Err(CodecError::NonTextFieldName));
    }

    #[test]
    fn garbage_is_a_decoding_error() {
        assert!(matches!(
            from_cbor(&[0xff, 0x00]),
            Err(CodecError::DecodingFailed { .. })
        ));
    }

    fn field_order_strategy() -> impl Strategy<Value = Vec<(String, i64)>> {
        prop::collection::vec(("[a-z]{1,6}", any::<i64>()), 0..12)
    }

    proptest! {
        #[test]
        fn field_order_survives_encoding(fields in field_order_strategy()) {
            let doc: Document = fields
                .into_iter()
                .map(|(k, v)| (k, Value::Integer(v)))
                .collect();
            let value = Value::Document(doc);
            let decoded = from_cbor(&to_cbor(&value).unwrap()).unwrap();
            prop_assert_eq!(decoded, value);
        }
    }
}
