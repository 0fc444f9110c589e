//! Structured report document: pretty JSON with keys sorted at every level.

use serde_json::{Map, Value};

use super::DiagnosticReport;
use crate::error::DiagnosticsError;

/// Encode a report. Identical reports always produce identical bytes.
pub fn encode(report: &DiagnosticReport) -> Result<String, DiagnosticsError> {
    let value = sort_keys(serde_json::to_value(report)?);
    Ok(serde_json::to_string_pretty(&value)?)
}

pub fn decode(document: &str) -> Result<DiagnosticReport, DiagnosticsError> {
    Ok(serde_json::from_str(document)?)
}

/// Rebuild every object with its keys in lexicographic order, independent of
/// how `serde_json` orders maps internally.
fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::new();
            for (key, inner) in entries {
                sorted.insert(key, sort_keys(inner));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}
