use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

use crate::error::{ImportError, Result};
use crate::models::HealthLogEntry;

pub mod csv;
pub mod json;
pub mod record;

use record::{FieldIssue, RawLogRecord, RecordCoercer};

/// Trait for reading health logs from different file formats
pub trait LogImporter {
    /// Check if this importer can handle the given file
    fn can_import(&self, file_path: &Path) -> bool;

    /// Read untyped records from the file
    fn read_records(&self, file_path: &Path) -> Result<Vec<RawLogRecord>>;

    /// Get the format name for this importer
    fn format_name(&self) -> &'static str;
}

/// Summary of one import
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    /// Records found in the source
    pub records: usize,
    /// Records that produced an entry
    pub imported: usize,
    /// Records dropped for lack of a usable date
    pub skipped: usize,
    pub issues: Vec<FieldIssue>,
}

impl ImportReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Entries read from one source with the report of what was dropped
#[derive(Debug, Clone, PartialEq)]
pub struct ImportBatch {
    pub entries: Vec<HealthLogEntry>,
    pub report: ImportReport,
}

/// Manager for coordinating different import formats
pub struct ImportManager {
    importers: Vec<Box<dyn LogImporter>>,
    coercer: RecordCoercer,
}

impl ImportManager {
    /// Create a new import manager with all available importers
    pub fn new() -> Self {
        let importers: Vec<Box<dyn LogImporter>> = vec![
            Box::new(csv::CsvImporter::new()),
            Box::new(json::JsonImporter::new()),
        ];

        Self {
            importers,
            coercer: RecordCoercer::new(),
        }
    }

    /// Import a single file, picking the importer by extension
    pub fn import_file(&self, file_path: &Path) -> Result<ImportBatch> {
        let importer = self
            .importers
            .iter()
            .find(|importer| importer.can_import(file_path))
            .ok_or_else(|| ImportError::UnsupportedFormat {
                path: file_path.to_path_buf(),
            })?;

        debug!(
            file = %file_path.display(),
            format = importer.format_name(),
            "Importing health log"
        );

        let records = importer.read_records(file_path)?;
        let batch = self.coerce_records(&records);

        info!(
            file = %file_path.display(),
            imported = batch.report.imported,
            skipped = batch.report.skipped,
            issues = batch.report.issues.len(),
            "Imported health log"
        );

        Ok(batch)
    }

    /// Coerce already-read records into entries
    pub fn coerce_records(&self, records: &[RawLogRecord]) -> ImportBatch {
        let mut entries = Vec::with_capacity(records.len());
        let mut report = ImportReport {
            records: records.len(),
            ..ImportReport::default()
        };

        for (row, record) in records.iter().enumerate() {
            let parsed = self.coercer.coerce(row, record);
            report.issues.extend(parsed.issues);
            match parsed.entry {
                Some(entry) => entries.push(entry),
                None => report.skipped += 1,
            }
        }
        report.imported = entries.len();

        ImportBatch { entries, report }
    }
}

impl Default for ImportManager {
    fn default() -> Self {
        Self::new()
    }
}
