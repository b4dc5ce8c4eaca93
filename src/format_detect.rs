use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::TaskError;

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Json,
    Toon,
    Csv,
}

impl OutputFormat {
    pub fn label(self) -> &'static str {
        match self {
            OutputFormat::Json => "JSON",
            OutputFormat::Toon => "TOON",
            OutputFormat::Csv => "CSV",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "toon" => Ok(OutputFormat::Toon),
            "csv" => Ok(OutputFormat::Csv),
            other => Err(TaskError::Config {
                message: format!("unknown output format: '{other}' (expected one of: json, toon, csv)"),
            }),
        }
    }
}

/// Detect the output format from a file path extension.
/// Returns the format and the (possibly normalized) path.
///
/// - `.json` → Json
/// - `.toon`, `.txt` → Toon
/// - `.csv` → Csv
/// - No extension → appends `.json`, returns Json
/// - Unrecognized → error with supported format list
pub fn detect_format(path: &Path) -> Result<(OutputFormat, PathBuf), TaskError> {
    let ext = match path.extension() {
        Some(e) => e.to_ascii_lowercase(),
        None => {
            let mut p = path.to_path_buf();
            p.set_extension("json");
            return Ok((OutputFormat::Json, p));
        }
    };

    let format = match ext.to_str().unwrap_or("") {
        "json" => OutputFormat::Json,
        "toon" | "txt" => OutputFormat::Toon,
        "csv" => OutputFormat::Csv,
        other => {
            return Err(TaskError::Format {
                message: format!(
                    "unsupported output format \".{other}\", supported: .json, .toon, .txt, .csv"
                ),
            });
        }
    };

    Ok((format, path.to_path_buf()))
}
