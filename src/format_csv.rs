use std::io::Write;
use std::path::Path;

use crate::backend::SqlValue;
use crate::error::TaskError;
use crate::format::value_to_json;
use crate::normalize::Payload;

/// Write a payload as RFC 4180 CSV to `path`.
pub fn write_csv(payload: &Payload, path: &Path) -> Result<(), TaskError> {
    let file = std::fs::File::create(path)?;
    write_csv_to_writer(payload, file)
}

/// Write a payload as RFC 4180 CSV (CRLF terminators, minimal quoting).
///
/// Rows get a header line of column names. An affected-row count is written
/// as a single `affected_rows` column. NULL cells are empty fields.
pub fn write_csv_to_writer<W: Write>(payload: &Payload, writer: W) -> Result<(), TaskError> {
    let mut wtr = csv::WriterBuilder::new()
        .terminator(csv::Terminator::CRLF)
        .from_writer(writer);

    match payload {
        Payload::Rows(rows) => {
            wtr.write_record(rows.columns().iter().map(|c| c.name.as_str()))
                .map_err(csv_error)?;
            for row in rows.rows() {
                wtr.write_record(row.iter().map(cell_text))
                    .map_err(csv_error)?;
            }
        }
        Payload::AffectedRows(count) => {
            wtr.write_record(["affected_rows"]).map_err(csv_error)?;
            wtr.write_record([count.to_string()]).map_err(csv_error)?;
        }
    }

    wtr.flush()?;
    Ok(())
}

fn cell_text(value: &SqlValue) -> String {
    match value {
        SqlValue::Null => String::new(),
        SqlValue::Decimal(s) | SqlValue::Text(s) => s.clone(),
        other => match value_to_json(other) {
            serde_json::Value::String(s) => s,
            serde_json::Value::Null => String::new(),
            json => json.to_string(),
        },
    }
}

fn csv_error(err: csv::Error) -> TaskError {
    TaskError::Format {
        message: format!("CSV write failed: {err}"),
    }
}
