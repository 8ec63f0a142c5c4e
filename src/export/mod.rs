use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::HealthLogEntry;

pub mod json;
pub mod text;

/// Export format types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportFormat {
    Json,
    Text,
}

impl std::str::FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "text" | "txt" | "table" => Ok(ExportFormat::Text),
            _ => Err(ExportError::UnsupportedFormat(s.to_string())),
        }
    }
}

/// Inclusive date range used to select a reporting window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        DateRange { start, end }
    }

    /// Check if a date falls within this range
    pub fn contains(&self, date: &NaiveDate) -> bool {
        let after_start = self.start.map_or(true, |start| date >= &start);
        let before_end = self.end.map_or(true, |end| date <= &end);
        after_start && before_end
    }

    /// Entries dated inside the range, in input order
    pub fn filter_entries(&self, entries: &[HealthLogEntry]) -> Vec<HealthLogEntry> {
        entries
            .iter()
            .filter(|e| self.contains(&e.date))
            .cloned()
            .collect()
    }
}

/// Export errors
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_parsing() {
        assert_eq!("JSON".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert_eq!("table".parse::<ExportFormat>().unwrap(), ExportFormat::Text);
        assert!("pdf".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn test_date_range_filter() {
        let d = |day| NaiveDate::from_ymd_opt(2024, 8, day).unwrap();
        let entries: Vec<HealthLogEntry> = (1..=5).map(|day| HealthLogEntry::new(d(day))).collect();

        let range = DateRange::new(Some(d(2)), Some(d(4)));
        let dates: Vec<NaiveDate> = range.filter_entries(&entries).iter().map(|e| e.date).collect();
        assert_eq!(dates, vec![d(2), d(3), d(4)]);

        assert_eq!(DateRange::default().filter_entries(&entries).len(), 5);
    }
}
