use std::collections::HashSet;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::backend::{ColumnMeta, SqlValue};
use crate::error::TaskError;
use crate::executor::Outcome;
use crate::normalize::{Payload, RowSet};

/// Convert a single cell to JSON.
///
/// Exact numerics stay strings so no digits are lost; dates and times use ISO
/// 8601 and binary data is base64.
pub fn value_to_json(value: &SqlValue) -> serde_json::Value {
    match value {
        SqlValue::Null => serde_json::Value::Null,
        SqlValue::Bool(b) => serde_json::Value::Bool(*b),
        SqlValue::Int(i) => serde_json::Value::from(*i),
        SqlValue::UInt(u) => serde_json::Value::from(*u),
        // NaN and infinities have no JSON form and become null.
        SqlValue::Float(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        SqlValue::Decimal(s) | SqlValue::Text(s) => serde_json::Value::String(s.clone()),
        SqlValue::Date(d) => serde_json::Value::String(d.format("%Y-%m-%d").to_string()),
        SqlValue::Time(t) => serde_json::Value::String(t.format("%H:%M:%S%.f").to_string()),
        SqlValue::DateTime(dt) => {
            serde_json::Value::String(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
        }
        SqlValue::Bytes(b) => serde_json::Value::String(STANDARD.encode(b)),
    }
}

/// Object keys for a result's columns, in column order.
///
/// A repeated name gets the lowest numeric suffix not already taken, so
/// `id, id, id1` becomes `id, id2, id1`.
pub fn column_keys(columns: &[ColumnMeta]) -> Vec<String> {
    let mut used: HashSet<String> = columns.iter().map(|c| c.name.clone()).collect();
    let mut seen = HashSet::new();

    columns
        .iter()
        .map(|column| {
            let name = column.name.as_str();
            if seen.insert(name) {
                return name.to_string();
            }
            let mut n = 1;
            while used.contains(&format!("{name}{n}")) {
                n += 1;
            }
            let key = format!("{name}{n}");
            used.insert(key.clone());
            key
        })
        .collect()
}

/// Rows as an array of objects whose keys follow column order.
pub fn rows_to_json(rows: &RowSet) -> serde_json::Value {
    let keys = column_keys(rows.columns());
    let array = rows
        .records()
        .map(|record| {
            let map: serde_json::Map<String, serde_json::Value> = keys
                .iter()
                .zip(record.fields())
                .map(|(key, (_, value))| (key.clone(), value_to_json(value)))
                .collect();
            serde_json::Value::Object(map)
        })
        .collect();
    serde_json::Value::Array(array)
}

pub fn payload_to_json(payload: &Payload) -> serde_json::Value {
    match payload {
        Payload::Rows(rows) => rows_to_json(rows),
        Payload::AffectedRows(count) => serde_json::Value::from(*count),
    }
}

/// `{"success": .., "message": .., "result": ..}`
pub fn outcome_to_json(outcome: &Outcome) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    map.insert(
        "success".to_string(),
        serde_json::Value::Bool(outcome.is_success()),
    );
    map.insert(
        "message".to_string(),
        outcome
            .message()
            .map_or(serde_json::Value::Null, |m| serde_json::Value::String(m.to_string())),
    );
    map.insert(
        "result".to_string(),
        outcome
            .payload()
            .map_or(serde_json::Value::Null, payload_to_json),
    );
    serde_json::Value::Object(map)
}

/// Pretty-printed JSON with a trailing newline.
pub fn to_json(value: &serde_json::Value) -> Result<String, TaskError> {
    let mut text = serde_json::to_string_pretty(value).map_err(|e| TaskError::Format {
        message: e.to_string(),
    })?;
    text.push('\n');
    Ok(text)
}

/// Convert a payload to a TOON-formatted string.
pub fn to_toon(payload: &Payload) -> Result<String, TaskError> {
    // toon_format can't infer columns from an empty array, so the header is
    // written by hand.
    if let Payload::Rows(rows) = payload
        && rows.is_empty()
        && !rows.columns().is_empty()
    {
        let col_names = column_keys(rows.columns()).join(",");
        return Ok(format!("[0]{{{}}}:\n", col_names));
    }

    encode_toon(&payload_to_json(payload))
}

/// Convert an outcome envelope to TOON.
pub fn outcome_to_toon(outcome: &Outcome) -> Result<String, TaskError> {
    encode_toon(&outcome_to_json(outcome))
}

fn encode_toon(value: &serde_json::Value) -> Result<String, TaskError> {
    toon_format::encode_default(value).map_err(|e| TaskError::Format {
        message: e.to_string(),
    })
}
