use csv::{ReaderBuilder, Trim};
use std::io::Read;
use std::path::Path;

use crate::error::{ImportError, Result};
use crate::import::record::{LogField, RawLogRecord, RawValue, RecordCoercer};
use crate::import::LogImporter;

/// CSV importer for spreadsheet exports of the daily log
///
/// Expects one row per day with a header row; columns are matched by name
/// in any order and spelling the coercer knows, unknown columns are ignored.
pub struct CsvImporter {
    coercer: RecordCoercer,
}

impl CsvImporter {
    pub fn new() -> Self {
        Self {
            coercer: RecordCoercer::new(),
        }
    }

    /// Read raw records from any CSV source
    pub fn read_from<R: Read>(&self, source: R) -> Result<Vec<RawLogRecord>> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(source);

        let headers = reader.headers().map_err(parse_error)?.clone();
        if !headers
            .iter()
            .any(|h| self.coercer.resolve(h) == Some(LogField::Date))
        {
            return Err(ImportError::MissingColumn {
                column: "Date".to_string(),
            }
            .into());
        }

        let mut records = Vec::new();
        for result in reader.records() {
            let row = result.map_err(parse_error)?;
            let fields = headers
                .iter()
                .zip(row.iter())
                .map(|(header, value)| (header.to_string(), RawValue::Text(value.to_string())))
                .collect();
            records.push(RawLogRecord { fields });
        }

        Ok(records)
    }
}

impl Default for CsvImporter {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_error(e: csv::Error) -> crate::error::HealthTrendError {
    ImportError::ParseError {
        format: "CSV".to_string(),
        reason: e.to_string(),
    }
    .into()
}

impl LogImporter for CsvImporter {
    fn can_import(&self, file_path: &Path) -> bool {
        file_path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("csv"))
            .unwrap_or(false)
    }

    fn read_records(&self, file_path: &Path) -> Result<Vec<RawLogRecord>> {
        let file = std::fs::File::open(file_path)?;
        self.read_from(file)
    }

    fn format_name(&self) -> &'static str {
        "CSV"
    }
}
