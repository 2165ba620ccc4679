//! Binary codec for [`RawEmailRecord`].
//!
//! Records travel as a single Avro binary datum (no container file header)
//! written against [`RAW_EMAIL_SCHEMA`]. Producer and consumer must share
//! the same schema version, there is no schema resolution on read.

use std::fmt::Display;

use apache_avro::{from_avro_datum, max_allocation_bytes, to_avro_datum, types::Value, Schema};
use base64::{engine::general_purpose, Engine as _};

use crate::RawEmailRecord;

/// Avro schema shared by every producer and consumer of email records.
pub const RAW_EMAIL_SCHEMA: &str = r#"{
    "type": "record",
    "name": "RawEmail",
    "namespace": "mailgate",
    "fields": [
        {"name": "from", "type": "string"},
        {"name": "to", "type": {"type": "array", "items": "string"}},
        {"name": "content", "type": "bytes"}
    ]
}"#;

/// Upper bound for a single allocation made by the Avro reader.
pub const MAX_ALLOCATION_BYTES: usize = 64 * 1024 * 1024;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while decoding or encoding a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The transport payload is not valid base64.
    Base64(String),
    /// The bytes do not conform to the record schema.
    Malformed(String),
    /// The record could not be written against the schema.
    Encode(String),
    /// The schema definition itself is invalid.
    Schema(String),
}

impl Display for CodecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodecError::Base64(msg) => write!(f, "Invalid base64 payload: {msg}"),
            CodecError::Malformed(msg) => write!(f, "Malformed record: {msg}"),
            CodecError::Encode(msg) => write!(f, "Encode error: {msg}"),
            CodecError::Schema(msg) => write!(f, "Schema error: {msg}"),
        }
    }
}

impl std::error::Error for CodecError {}

/// Decodes a base64 transport payload (standard alphabet, padded) into bytes.
pub fn decode_base64(data: &str) -> CodecResult<Vec<u8>> {
    general_purpose::STANDARD
        .decode(data.trim())
        .map_err(|e| CodecError::Base64(e.to_string()))
}

/// Encodes bytes as a base64 transport payload (standard alphabet, padded).
pub fn encode_base64(bytes: &[u8]) -> String {
    general_purpose::STANDARD.encode(bytes)
}

/// Encoder/decoder for [`RawEmailRecord`] bound to [`RAW_EMAIL_SCHEMA`].
///
/// The schema is parsed once on construction; the codec is then shared
/// (read-only) by every dispatch.
#[derive(Debug, Clone)]
pub struct RecordCodec {
    schema: Schema,
}

impl RecordCodec {
    /// Creates a new [`RecordCodec`] for the built-in record schema.
    pub fn new() -> CodecResult<Self> {
        let schema =
            Schema::parse_str(RAW_EMAIL_SCHEMA).map_err(|e| CodecError::Schema(e.to_string()))?;
        // process wide, only the first call takes effect
        max_allocation_bytes(MAX_ALLOCATION_BYTES);
        Ok(Self { schema })
    }

    /// Decodes a single binary datum into a [`RawEmailRecord`].
    ///
    /// The whole input must be consumed, trailing bytes after the datum are
    /// treated as a malformed record. Declared lengths and array block counts
    /// are checked against the input before the Avro reader sizes anything.
    pub fn decode(&self, bytes: &[u8]) -> CodecResult<RawEmailRecord> {
        check_lengths(bytes)?;
        let mut reader = bytes;
        let value = from_avro_datum(&self.schema, &mut reader, None)
            .map_err(|e| CodecError::Malformed(e.to_string()))?;
        if !reader.is_empty() {
            return Err(CodecError::Malformed(format!(
                "{} trailing bytes after record",
                reader.len()
            )));
        }
        record_from_value(value)
    }

    /// Encodes a [`RawEmailRecord`] as a single binary datum.
    pub fn encode(&self, record: &RawEmailRecord) -> CodecResult<Vec<u8>> {
        let value = Value::Record(vec![
            ("from".to_string(), Value::String(record.from().to_string())),
            (
                "to".to_string(),
                Value::Array(
                    record
                        .to()
                        .iter()
                        .map(|rcpt| Value::String(rcpt.clone()))
                        .collect(),
                ),
            ),
            ("content".to_string(), Value::Bytes(record.content().to_vec())),
        ]);
        to_avro_datum(&self.schema, value).map_err(|e| CodecError::Encode(e.to_string()))
    }
}

/// Walks the datum layout and rejects any length or block count that
/// cannot fit in the remaining input.
fn check_lengths(mut input: &[u8]) -> CodecResult<()> {
    let input = &mut input;
    skip_sized(input, "from")?;
    loop {
        let count = read_long(input)?;
        if count == 0 {
            break;
        }
        if count < 0 {
            // negative count is followed by the block size in bytes
            read_long(input)?;
        }
        let count = count.unsigned_abs();
        if count > input.len() as u64 {
            return Err(CodecError::Malformed(format!(
                "array block of {count} items exceeds {} remaining bytes",
                input.len()
            )));
        }
        for _ in 0..count {
            skip_sized(input, "to")?;
        }
    }
    skip_sized(input, "content")
}

fn skip_sized(input: &mut &[u8], field: &str) -> CodecResult<()> {
    let len = read_long(input)?;
    if len < 0 || len as u64 > input.len() as u64 {
        return Err(CodecError::Malformed(format!(
            "length {len} of {field} exceeds {} remaining bytes",
            input.len()
        )));
    }
    *input = &input[len as usize..];
    Ok(())
}

/// Reads one zig-zag encoded variable length long.
fn read_long(input: &mut &[u8]) -> CodecResult<i64> {
    let mut value = 0u64;
    for shift in (0..64).step_by(7) {
        let (&byte, rest) = input
            .split_first()
            .ok_or_else(|| CodecError::Malformed("unexpected end of input".to_string()))?;
        *input = rest;
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok((value >> 1) as i64 ^ -((value & 1) as i64));
        }
    }
    Err(CodecError::Malformed("variable length long overflows".to_string()))
}

fn record_from_value(value: Value) -> CodecResult<RawEmailRecord> {
    let fields = match value {
        Value::Record(fields) => fields,
        other => {
            return Err(CodecError::Malformed(format!(
                "expected record, found {other:?}"
            )))
        }
    };

    let mut from = None;
    let mut to = None;
    let mut content = None;

    for (name, value) in fields {
        match (name.as_str(), value) {
            ("from", Value::String(value)) => from = Some(value),
            ("to", Value::Array(items)) => {
                let rcpts = items
                    .into_iter()
                    .map(|item| match item {
                        Value::String(rcpt) => Ok(rcpt),
                        other => Err(CodecError::Malformed(format!(
                            "expected string recipient, found {other:?}"
                        ))),
                    })
                    .collect::<CodecResult<Vec<_>>>()?;
                to = Some(rcpts);
            }
            ("content", Value::Bytes(bytes)) => content = Some(bytes),
            (name, other) => {
                return Err(CodecError::Malformed(format!(
                    "unexpected value for field {name}: {other:?}"
                )))
            }
        }
    }

    match (from, to, content) {
        (Some(from), Some(to), Some(content)) => Ok(RawEmailRecord::new(from, to, content)),
        _ => Err(CodecError::Malformed("missing record field".to_string())),
    }
}
