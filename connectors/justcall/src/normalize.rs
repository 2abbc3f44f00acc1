//! Maps call records of any integration flavour onto [`TranscriptRecord`].
//!
//! Each output field is resolved from an ordered list of JSON paths; the first
//! path holding a non-empty value wins, otherwise the field's fallback literal
//! is used. Extending a field means appending a path to its table.

use serde_json::Value;

use crate::models::TranscriptRecord;

pub const NO_TRANSCRIPT: &str = "[No Transcript Found]";
pub const UNKNOWN: &str = "Unknown";
pub const ZERO_DURATION: &str = "0";

type FieldPath = &'static [&'static str];

pub const TRANSCRIPT_PATHS: &[FieldPath] = &[
    &["iq_transcript"],
    &["call_transcription"],
    &["transcription"],
    &["extra_details", "transcript"],
    &["justcall_iq", "transcript"],
];

const ID_PATHS: &[FieldPath] = &[&["id"], &["call_id"]];
const DATETIME_PATHS: &[FieldPath] = &[&["datetime"], &["date"]];
const FROM_PATHS: &[FieldPath] = &[&["from"]];
const TO_PATHS: &[FieldPath] = &[&["to"]];
const DURATION_PATHS: &[FieldPath] = &[&["duration"]];
const DIRECTION_PATHS: &[FieldPath] = &[&["direction"]];
const RECORDING_PATHS: &[FieldPath] = &[&["recording_url"]];

/// Never fails: records of any shape, including non-objects, produce a row.
pub fn normalize_record(raw: &Value) -> TranscriptRecord {
    TranscriptRecord {
        id: resolve(raw, ID_PATHS, UNKNOWN),
        datetime: resolve(raw, DATETIME_PATHS, UNKNOWN),
        from: resolve(raw, FROM_PATHS, UNKNOWN),
        to: resolve(raw, TO_PATHS, UNKNOWN),
        duration: resolve(raw, DURATION_PATHS, ZERO_DURATION),
        direction: resolve(raw, DIRECTION_PATHS, UNKNOWN),
        transcript: resolve(raw, TRANSCRIPT_PATHS, NO_TRANSCRIPT),
        recording_url: resolve(raw, RECORDING_PATHS, ""),
    }
}

fn resolve(raw: &Value, paths: &[FieldPath], fallback: &str) -> String {
    paths
        .iter()
        .filter_map(|path| lookup(raw, path))
        .find_map(as_text)
        .unwrap_or_else(|| fallback.to_string())
}

fn lookup<'a>(raw: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(raw, |node, key| node.as_object()?.get(*key))
}

/// Text form of a present value, or `None` when the value counts as empty.
/// Structured values are kept as their JSON text rather than dropped.
fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Array(items) if items.is_empty() => None,
        Value::Object(map) if map.is_empty() => None,
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}
