use crate::error::TaskError;
use std::path::Path;

/// Print a rendered result to stdout.
pub fn print_result(rendered: &str) {
    print!("{}", rendered);
}

/// Print error to stderr in the contract format: error: <category>: <message>
pub fn print_error(err: &TaskError) {
    eprintln!("error: {}", err);
}

/// Build the file output summary printed after writing `-o`.
///
/// Summary includes: `file`, `format`, and either `rows_written` or
/// `affected_rows`.
pub fn summary(path: &Path, format: &str, rows: Option<usize>, affected: Option<u64>) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    map.insert(
        "file".to_string(),
        serde_json::Value::String(path.display().to_string()),
    );
    map.insert(
        "format".to_string(),
        serde_json::Value::String(format.to_string()),
    );
    if let Some(rows) = rows {
        map.insert("rows_written".to_string(), serde_json::Value::from(rows));
    }
    if let Some(affected) = affected {
        map.insert("affected_rows".to_string(), serde_json::Value::from(affected));
    }
    serde_json::Value::Object(map)
}

/// Print the file output summary to stdout as a TOON object.
pub fn print_summary(summary: &serde_json::Value) -> Result<(), TaskError> {
    let toon = toon_format::encode_default(summary).map_err(|e| TaskError::Format {
        message: e.to_string(),
    })?;
    print!("{}", toon);
    Ok(())
}

/// Write rendered output to a file.
pub fn write_file(rendered: &str, path: &Path) -> Result<(), TaskError> {
    ensure_parent_exists(path)?;
    std::fs::write(path, rendered)?;
    Ok(())
}

/// Fail early when the output directory is missing.
pub fn ensure_parent_exists(path: &Path) -> Result<(), TaskError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        return Err(TaskError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("parent directory does not exist: {}", parent.display()),
        )));
    }
    Ok(())
}
