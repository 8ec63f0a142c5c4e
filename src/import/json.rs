use serde_json::Value;
use std::path::Path;

use crate::error::{ImportError, Result};
use crate::import::record::RawLogRecord;
use crate::import::LogImporter;

/// JSON importer
///
/// Accepts either a bare array of log objects or an object wrapping the
/// array under `logs` or `entries`.
pub struct JsonImporter;

impl JsonImporter {
    pub fn new() -> Self {
        Self
    }

    pub fn read_str(&self, content: &str) -> Result<Vec<RawLogRecord>> {
        let document: Value = serde_json::from_str(content).map_err(|e| ImportError::ParseError {
            format: "JSON".to_string(),
            reason: e.to_string(),
        })?;

        let items = match document {
            Value::Array(items) => items,
            Value::Object(mut map) => match map.remove("logs").or_else(|| map.remove("entries")) {
                Some(Value::Array(items)) => items,
                _ => {
                    return Err(ImportError::InvalidStructure {
                        reason: "expected an array of logs or a \"logs\" array".to_string(),
                    }
                    .into())
                }
            },
            _ => {
                return Err(ImportError::InvalidStructure {
                    reason: "top-level value must be an array or object".to_string(),
                }
                .into())
            }
        };

        items.into_iter().map(RawLogRecord::try_from).collect()
    }
}

impl Default for JsonImporter {
    fn default() -> Self {
        Self::new()
    }
}

impl LogImporter for JsonImporter {
    fn can_import(&self, file_path: &Path) -> bool {
        file_path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false)
    }

    fn read_records(&self, file_path: &Path) -> Result<Vec<RawLogRecord>> {
        let content = std::fs::read_to_string(file_path)?;
        self.read_str(&content)
    }

    fn format_name(&self) -> &'static str {
        "JSON"
    }
}
