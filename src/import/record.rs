//! Coercion of loosely typed log records into [`HealthLogEntry`]
//!
//! Exported logs carry numbers as strings, flare flags as "Yes"/"No" and
//! column names in several spellings. Every field goes through one explicit
//! coercion step; anything that cannot be coerced is reported as a
//! [`FieldIssue`] instead of being guessed.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::trace;

use crate::error::{HealthTrendError, Result};
use crate::models::{FlareStatus, HealthLogEntry, Metric};

/// A field value as found in the source file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<RawValue>),
    Object(serde_json::Map<String, serde_json::Value>),
}

impl RawValue {
    fn describe(&self) -> String {
        match self {
            RawValue::Null => "null".to_string(),
            RawValue::Bool(b) => b.to_string(),
            RawValue::Number(n) => n.to_string(),
            RawValue::Text(s) => s.clone(),
            RawValue::List(items) => format!("[{} items]", items.len()),
            RawValue::Object(map) => format!("{{{} fields}}", map.len()),
        }
    }

    fn is_blank(&self) -> bool {
        match self {
            RawValue::Null => true,
            RawValue::Text(s) => s.trim().is_empty(),
            RawValue::List(items) => items.is_empty(),
            RawValue::Object(map) => map.is_empty(),
            _ => false,
        }
    }
}

/// One untyped record: field names in source order with their raw values
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawLogRecord {
    pub fields: Vec<(String, RawValue)>,
}

impl RawLogRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: RawValue) -> Self {
        self.fields.push((name.into(), value));
        self
    }
}

impl TryFrom<serde_json::Value> for RawLogRecord {
    type Error = HealthTrendError;

    fn try_from(value: serde_json::Value) -> Result<Self> {
        let map = match value {
            serde_json::Value::Object(map) => map,
            other => {
                return Err(HealthTrendError::invalid_argument(format!(
                    "log record must be a JSON object, got {}",
                    json_kind(&other)
                )))
            }
        };

        let fields = map
            .into_iter()
            .map(|(name, value)| {
                let raw = serde_json::from_value(value)
                    .map_err(|e| HealthTrendError::Serialization(e.to_string()))?;
                Ok((name, raw))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(RawLogRecord { fields })
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

/// A field that could not be coerced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldIssue {
    /// Zero-based record index in the source
    pub row: usize,
    pub field: String,
    pub value: String,
    pub reason: String,
}

/// Outcome of coercing one record
///
/// `entry` is `None` when the record has no usable date; other bad fields
/// are left unset on the entry and listed in `issues`.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRecord {
    pub entry: Option<HealthLogEntry>,
    pub issues: Vec<FieldIssue>,
}

/// Log field a source column maps to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogField {
    Date,
    Metric(Metric),
    Flare,
    Stressors,
    Symptoms,
    PainLocation,
    Notes,
}

/// Maps source columns onto log fields and coerces their values
#[derive(Debug, Clone)]
pub struct RecordCoercer {
    field_mapping: HashMap<String, LogField>,
}

const DATE_FORMATS: [&str; 5] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d.%m.%Y", "%Y%m%d"];

impl RecordCoercer {
    pub fn new() -> Self {
        let mut field_mapping = HashMap::new();

        Self::add_mapping(&mut field_mapping, LogField::Date, &["date", "day", "logdate", "timestamp"]);
        Self::add_mapping(
            &mut field_mapping,
            LogField::Flare,
            &["flare", "flareup", "flareyesno", "isflare", "flaring"],
        );
        Self::add_mapping(&mut field_mapping, LogField::Stressors, &["stressors", "stress"]);
        Self::add_mapping(&mut field_mapping, LogField::Symptoms, &["symptoms", "othersymptoms"]);
        Self::add_mapping(
            &mut field_mapping,
            LogField::PainLocation,
            &["painlocation", "painlocations", "wherepain"],
        );
        Self::add_mapping(&mut field_mapping, LogField::Notes, &["notes", "note", "comments"]);

        for metric in Metric::ALL {
            Self::add_mapping(&mut field_mapping, LogField::Metric(metric), &[metric.key(), metric.label()]);
        }
        let aliases: [(Metric, &[&str]); 7] = [
            (Metric::Bpm, &["hr", "heartrate", "restinghr", "restingheartrate", "pulse"]),
            (Metric::Weight, &["weightkg", "bodyweight"]),
            (Metric::Sleep, &["sleepquality"]),
            (Metric::DailyFunction, &["function", "dailyfunctioning"]),
            (Metric::WeatherSensitivity, &["weather"]),
            (Metric::Steps, &["stepcount", "dailysteps"]),
            (Metric::Hydration, &["water", "waterintake", "glassesofwater"]),
        ];
        for (metric, names) in aliases {
            Self::add_mapping(&mut field_mapping, LogField::Metric(metric), names);
        }

        Self { field_mapping }
    }

    fn add_mapping(mapping: &mut HashMap<String, LogField>, field: LogField, variations: &[&str]) {
        for variation in variations {
            mapping.insert(normalize_name(variation), field);
        }
    }

    /// Field a column name refers to, ignoring case and punctuation
    pub fn resolve(&self, column: &str) -> Option<LogField> {
        self.field_mapping.get(&normalize_name(column)).copied()
    }

    pub fn coerce(&self, row: usize, record: &RawLogRecord) -> ParsedRecord {
        let mut issues = Vec::new();
        let mut issue = |field: &str, value: &RawValue, reason: &str| {
            issues.push(FieldIssue {
                row,
                field: field.to_string(),
                value: value.describe(),
                reason: reason.to_string(),
            });
        };

        let mut date = None;
        let mut values: Vec<(Metric, f64)> = Vec::new();
        let mut flare = None;
        let mut stressors = Vec::new();
        let mut symptoms = Vec::new();
        let mut pain_location = None;
        let mut notes = None;

        for (name, value) in &record.fields {
            let Some(field) = self.resolve(name) else {
                trace!(row, column = %name, "Ignoring unknown column");
                continue;
            };
            if value.is_blank() {
                continue;
            }

            match field {
                LogField::Date => match coerce_date(value) {
                    Some(d) => date = Some(d),
                    None => issue(name, value, "unrecognised date"),
                },
                LogField::Metric(metric) => match coerce_number(value) {
                    Some(v) if metric.is_valid(v) => values.push((metric, v)),
                    Some(_) => issue(name, value, "outside the valid range"),
                    None => issue(name, value, "not a number"),
                },
                LogField::Flare => match coerce_flare(value) {
                    Some(status) => flare = Some(status),
                    None => issue(name, value, "expected yes or no"),
                },
                LogField::Stressors => stressors = coerce_list(value),
                LogField::Symptoms => symptoms = coerce_list(value),
                LogField::PainLocation => pain_location = coerce_text(value),
                LogField::Notes => notes = coerce_text(value),
            }
        }

        let Some(date) = date else {
            if !issues.iter().any(|i| self.resolve(&i.field) == Some(LogField::Date)) {
                issues.push(FieldIssue {
                    row,
                    field: "date".to_string(),
                    value: String::new(),
                    reason: "missing date".to_string(),
                });
            }
            return ParsedRecord { entry: None, issues };
        };

        let mut entry = HealthLogEntry::new(date);
        for (metric, value) in values {
            entry.set_value(metric, Some(value));
        }
        entry.flare = flare;
        entry.stressors = stressors;
        entry.symptoms = symptoms;
        entry.pain_location = pain_location;
        entry.notes = notes;

        ParsedRecord {
            entry: Some(entry),
            issues,
        }
    }
}

impl Default for RecordCoercer {
    fn default() -> Self {
        Self::new()
    }
}

/// Lowercase and keep only letters and digits: "Back Pain" and "back_pain"
/// both become "backpain"
fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

fn coerce_date(value: &RawValue) -> Option<NaiveDate> {
    let RawValue::Text(text) = value else {
        return None;
    };
    let text = text.trim();

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Some(date);
        }
    }

    // ISO timestamps: keep the calendar date
    match text.as_bytes().get(10) {
        Some(b'T') | Some(b' ') => text
            .get(..10)
            .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok()),
        _ => None,
    }
}

fn coerce_number(value: &RawValue) -> Option<f64> {
    match value {
        RawValue::Number(n) => Some(*n),
        RawValue::Text(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}

fn coerce_flare(value: &RawValue) -> Option<FlareStatus> {
    match value {
        RawValue::Bool(true) => Some(FlareStatus::Yes),
        RawValue::Bool(false) => Some(FlareStatus::No),
        RawValue::Number(n) if *n == 1.0 => Some(FlareStatus::Yes),
        RawValue::Number(n) if *n == 0.0 => Some(FlareStatus::No),
        RawValue::Text(s) => match s.trim().to_lowercase().as_str() {
            "yes" | "y" | "true" | "1" => Some(FlareStatus::Yes),
            "no" | "n" | "false" | "0" => Some(FlareStatus::No),
            _ => None,
        },
        _ => None,
    }
}

fn coerce_list(value: &RawValue) -> Vec<String> {
    match value {
        RawValue::List(items) => items.iter().filter_map(coerce_text).collect(),
        RawValue::Text(s) => s
            .split([',', ';'])
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn coerce_text(value: &RawValue) -> Option<String> {
    match value {
        RawValue::Text(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        RawValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> RawValue {
        RawValue::Text(s.to_string())
    }

    #[test]
    fn test_column_names_resolve_across_spellings() {
        let coercer = RecordCoercer::new();
        assert_eq!(coercer.resolve("Back Pain"), Some(LogField::Metric(Metric::BackPain)));
        assert_eq!(coercer.resolve("backPain"), Some(LogField::Metric(Metric::BackPain)));
        assert_eq!(coercer.resolve("back_pain"), Some(LogField::Metric(Metric::BackPain)));
        assert_eq!(coercer.resolve("Flare (Yes/No)"), Some(LogField::Flare));
        assert_eq!(coercer.resolve("Resting HR"), Some(LogField::Metric(Metric::Bpm)));
        assert_eq!(coercer.resolve("Daily Function"), Some(LogField::Metric(Metric::DailyFunction)));
        assert_eq!(coercer.resolve("favourite colour"), None);
    }

    #[test]
    fn test_string_fields_are_coerced() {
        let record = RawLogRecord::new()
            .with("Date", text("2024-03-05"))
            .with("BPM", text("64"))
            .with("Weight", RawValue::Number(71.4))
            .with("Fatigue", text(" 6.5 "))
            .with("Flare", text("Yes"))
            .with("Notes", text("stiff morning"));

        let parsed = RecordCoercer::new().coerce(0, &record);
        assert!(parsed.issues.is_empty());

        let entry = parsed.entry.unwrap();
        assert_eq!(entry.date, NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());
        assert_eq!(entry.bpm, Some(64.0));
        assert_eq!(entry.weight, Some(71.4));
        assert_eq!(entry.fatigue, Some(6.5));
        assert_eq!(entry.flare, Some(FlareStatus::Yes));
        assert_eq!(entry.notes.as_deref(), Some("stiff morning"));
    }

    #[test]
    fn test_bad_values_are_reported_not_guessed() {
        let record = RawLogRecord::new()
            .with("date", text("2024-03-05"))
            .with("sleep", text("lots"))
            .with("mood", RawValue::Number(14.0))
            .with("flare", text("maybe"))
            .with("stiffness", text(""));

        let parsed = RecordCoercer::new().coerce(3, &record);
        let entry = parsed.entry.unwrap();

        assert_eq!(entry.sleep, None);
        assert_eq!(entry.mood, None);
        assert_eq!(entry.flare, None);
        assert_eq!(entry.stiffness, None);

        let fields: Vec<&str> = parsed.issues.iter().map(|i| i.field.as_str()).collect();
        assert_eq!(fields, vec!["sleep", "mood", "flare"]);
        assert!(parsed.issues.iter().all(|i| i.row == 3));
    }

    #[test]
    fn test_record_without_date_is_rejected() {
        let record = RawLogRecord::new().with("fatigue", RawValue::Number(4.0));
        let parsed = RecordCoercer::new().coerce(0, &record);

        assert!(parsed.entry.is_none());
        assert_eq!(parsed.issues.len(), 1);
        assert_eq!(parsed.issues[0].reason, "missing date");

        let record = RawLogRecord::new().with("Date", text("31st of May"));
        let parsed = RecordCoercer::new().coerce(0, &record);
        assert!(parsed.entry.is_none());
        assert_eq!(parsed.issues.len(), 1);
        assert_eq!(parsed.issues[0].reason, "unrecognised date");
    }

    #[test]
    fn test_date_formats() {
        for raw in ["2024-07-09", "2024/07/09", "07/09/2024", "09.07.2024", "2024-07-09T08:30:00Z"] {
            assert_eq!(
                coerce_date(&text(raw)),
                NaiveDate::from_ymd_opt(2024, 7, 9),
                "failed on {}",
                raw
            );
        }
    }

    #[test]
    fn test_lists_from_text_and_arrays() {
        assert_eq!(coerce_list(&text("work; travel, poor sleep")), vec!["work", "travel", "poor sleep"]);
        assert_eq!(
            coerce_list(&RawValue::List(vec![text("heat"), RawValue::Null])),
            vec!["heat"]
        );
    }

    #[test]
    fn test_json_record_must_be_object() {
        let err = RawLogRecord::try_from(serde_json::json!([1, 2])).unwrap_err();
        assert!(matches!(err, HealthTrendError::InvalidArgument(_)));

        let record = RawLogRecord::try_from(serde_json::json!({
            "date": "2024-01-02",
            "flare": true,
            "symptoms": ["rash"]
        }))
        .unwrap();
        assert_eq!(record.fields.len(), 3);
    }

    #[test]
    fn test_nested_objects_are_kept_as_raw_values() {
        let record = RawLogRecord::try_from(serde_json::json!({
            "date": "2024-01-02",
            "sleep": 7,
            "meta": {"source": "app"},
            "fatigue": {"value": 3}
        }))
        .unwrap();
        assert_eq!(record.fields.len(), 4);

        let parsed = RecordCoercer::new().coerce(0, &record);
        let entry = parsed.entry.unwrap();
        assert_eq!(entry.sleep, Some(7.0));
        assert_eq!(entry.fatigue, None);

        assert_eq!(parsed.issues.len(), 1);
        assert_eq!(parsed.issues[0].field, "fatigue");
        assert_eq!(parsed.issues[0].value, "{1 fields}");
        assert_eq!(parsed.issues[0].reason, "not a number");
    }
}
