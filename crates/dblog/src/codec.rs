//! Record payload encoding
//!
//! Payloads start with a one-byte format tag:
//!
//! - `0x01` followed by the record as a JSON object (every field except
//!   the positional `args`)
//! - `0x02` followed by UTF-8 diagnostic text, written when a record could
//!   not be encoded normally
//!
//! Decoding never fails. A payload that cannot be understood turns into a
//! synthetic record describing the problem, so one corrupt entry cannot
//! abort a scan.

use std::fmt::Debug;

use tracing::warn;

use crate::record::{EventRecord, FieldValue, Level};

/// Tag of a normally encoded record
pub const RECORD_TAG: u8 = 0x01;

/// Tag of a fallback diagnostic payload
pub const FALLBACK_TAG: u8 = 0x02;

/// Logger name given to records decoded from fallback payloads
pub const FALLBACK_RECORD_NAME: &str = "dblog.fallback";

/// Logger name given to records synthesized for undecodable payloads
pub const DECODE_ERROR_RECORD_NAME: &str = "dblog.decode";

/// Default cap on an encoded record
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 1024 * 1024;

const DUMP_FIELD_LIMIT: usize = 4096;
const RAW_PREVIEW_LIMIT: usize = 256;

/// Outcome of [`EventCodec::serialize`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SerializeResult {
    /// The record in its normal encoding
    Encoded(Vec<u8>),
    /// A diagnostic payload standing in for a record that could not be
    /// represented
    Fallback(Vec<u8>),
}

impl SerializeResult {
    pub fn is_fallback(&self) -> bool {
        matches!(self, SerializeResult::Fallback(_))
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            SerializeResult::Encoded(bytes) | SerializeResult::Fallback(bytes) => bytes,
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            SerializeResult::Encoded(bytes) | SerializeResult::Fallback(bytes) => bytes,
        }
    }

    /// Diagnostic text of a fallback payload
    pub fn diagnostic(&self) -> Option<String> {
        match self {
            SerializeResult::Encoded(_) => None,
            SerializeResult::Fallback(bytes) => {
                Some(String::from_utf8_lossy(bytes.get(1..).unwrap_or_default()).into_owned())
            }
        }
    }
}

/// Serializes records to payloads and back
#[derive(Debug, Clone)]
pub struct EventCodec {
    max_payload_bytes: usize,
}

impl Default for EventCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PAYLOAD_BYTES)
    }
}

fn truncated(mut text: String, limit: usize) -> String {
    if text.len() > limit {
        let mut cut = limit;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        let dropped = text.len() - cut;
        text.truncate(cut);
        text.push_str(&format!("... ({dropped} more bytes)"));
    }
    text
}

fn dump(value: &impl Debug) -> String {
    truncated(format!("{value:?}"), DUMP_FIELD_LIMIT)
}

/// Name of the first float field that JSON cannot carry faithfully
fn non_finite_field(record: &EventRecord) -> Option<String> {
    if !record.created.is_finite() {
        return Some("created".to_string());
    }
    record.extra.iter().find_map(|(key, value)| match value {
        FieldValue::Float(v) if !v.is_finite() => Some(format!("extra.{key}")),
        _ => None,
    })
}

impl EventCodec {
    pub fn new(max_payload_bytes: usize) -> Self {
        Self { max_payload_bytes }
    }

    pub fn max_payload_bytes(&self) -> usize {
        self.max_payload_bytes
    }

    /// Encode a record, substituting a diagnostic payload when the record
    /// cannot be represented
    pub fn serialize(&self, record: &EventRecord) -> SerializeResult {
        match self.try_encode(record) {
            Ok(payload) => SerializeResult::Encoded(payload),
            Err(reason) => {
                warn!(%reason, "Record could not be encoded, writing diagnostic payload");
                SerializeResult::Fallback(Self::fallback_payload(
                    record,
                    &[format!("failed to encode log record: {reason}")],
                ))
            }
        }
    }

    /// Normal encoding, or the reason it is impossible
    pub fn try_encode(&self, record: &EventRecord) -> Result<Vec<u8>, String> {
        if let Some(field) = non_finite_field(record) {
            return Err(format!("field {field} holds a non-finite float"));
        }

        let mut payload = vec![RECORD_TAG];
        serde_json::to_writer(&mut payload, record).map_err(|e| e.to_string())?;

        if payload.len() > self.max_payload_bytes {
            return Err(format!(
                "encoded record is {} bytes, limit is {}",
                payload.len(),
                self.max_payload_bytes
            ));
        }

        Ok(payload)
    }

    /// Plain-text dump of whatever can be stringified, prefixed by the
    /// failure reasons
    pub fn fallback_payload(record: &EventRecord, failures: &[String]) -> Vec<u8> {
        let mut lines: Vec<String> = failures.to_vec();
        lines.push(format!("record.created = {}", record.created));
        lines.push(format!("record.level = {}", record.level));
        lines.push(format!("record.name = {}", dump(&record.name)));
        lines.push(format!("record.message = {}", dump(&record.message)));
        if !record.args.is_empty() {
            lines.push(format!("record.args = {}", dump(&record.args)));
        }
        if let (Some(file), Some(line)) = (&record.file, record.line) {
            lines.push(format!("record.location = {file}:{line}"));
        }
        lines.push(format!("record.pid = {}", record.pid));
        if let Some(exception) = &record.exception {
            lines.push(format!(
                "record.exception = {}",
                truncated(exception.format_trace(), DUMP_FIELD_LIMIT)
            ));
        }
        if !record.extra.is_empty() {
            lines.push(format!("record.extra = {}", dump(&record.extra)));
        }

        let mut payload = vec![FALLBACK_TAG];
        payload.extend_from_slice(lines.join("\n").as_bytes());
        payload
    }

    /// Decode a payload; never fails
    pub fn deserialize(payload: &[u8]) -> EventRecord {
        Self::deserialize_at(payload, 0.0)
    }

    /// Decode a payload, stamping synthetic records with `fallback_created`
    ///
    /// Readers pass the key's timestamp so synthetic records still sort and
    /// print at the time they were stored.
    pub fn deserialize_at(payload: &[u8], fallback_created: f64) -> EventRecord {
        match payload.split_first() {
            Some((&RECORD_TAG, body)) => match serde_json::from_slice::<EventRecord>(body) {
                Ok(record) => record,
                Err(e) => undecodable(payload, &format!("invalid record body: {e}"), fallback_created),
            },
            Some((&FALLBACK_TAG, body)) => {
                let text = String::from_utf8_lossy(body);
                let message = if text.trim().is_empty() {
                    "empty fallback payload".to_string()
                } else {
                    text.into_owned()
                };
                synthetic(Level::Critical, FALLBACK_RECORD_NAME, message, fallback_created)
            }
            Some((tag, _)) => undecodable(
                payload,
                &format!("unknown format tag 0x{tag:02x}"),
                fallback_created,
            ),
            None => undecodable(payload, "empty payload", fallback_created),
        }
    }
}

fn synthetic(level: Level, name: &str, message: String, created: f64) -> EventRecord {
    let mut record = EventRecord::new(level, message).with_name(name).at(created);
    record.pid = 0;
    record.humantime = record.format_humantime();
    record
}

fn undecodable(payload: &[u8], reason: &str, created: f64) -> EventRecord {
    let preview_len = payload.len().min(RAW_PREVIEW_LIMIT);
    let mut preview = payload[..preview_len].escape_ascii().to_string();
    if payload.len() > preview_len {
        preview.push_str(&format!("... ({} more bytes)", payload.len() - preview_len));
    }

    synthetic(
        Level::Error,
        DECODE_ERROR_RECORD_NAME,
        format!("failed to decode log record ({reason}): b\"{preview}\""),
        created,
    )
}
