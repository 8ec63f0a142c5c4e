//! Per-metric time series extraction
//!
//! Log entries arrive unordered and possibly with repeated dates. A
//! [`DailyLog`] normalises them once (sorted, one entry per date, last
//! occurrence wins); [`MetricSeriesExtractor`] then turns that view into a
//! clean [`MetricSeries`] per metric. Missing or out-of-domain values are
//! skipped, never interpolated.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::trace;

use crate::models::{HealthLogEntry, Metric};

/// One valid observation of a metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesPoint {
    pub date: NaiveDate,
    /// Days since the series origin
    pub day_offset: i64,
    pub value: f64,
}

/// Ordered observations of one metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSeries {
    pub metric: Metric,
    /// Date of the first valid observation, `None` for an empty series
    pub origin: Option<NaiveDate>,
    pub points: Vec<SeriesPoint>,
}

impl MetricSeries {
    pub fn empty(metric: Metric) -> Self {
        MetricSeries {
            metric,
            origin: None,
            points: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn day_offsets(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.day_offset as f64).collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    pub fn last(&self) -> Option<&SeriesPoint> {
        self.points.last()
    }

    /// Value observed on a date, if any
    pub fn value_on(&self, date: NaiveDate) -> Option<f64> {
        self.points
            .binary_search_by_key(&date, |p| p.date)
            .ok()
            .map(|i| self.points[i].value)
    }
}

/// Entries sorted by date with at most one entry per date
#[derive(Debug, Clone)]
pub struct DailyLog<'a> {
    entries: Vec<&'a HealthLogEntry>,
}

impl<'a> DailyLog<'a> {
    /// Normalise caller-supplied entries without copying them
    ///
    /// When a date repeats, the entry appearing last in `entries` is kept.
    pub fn from_entries(entries: &'a [HealthLogEntry]) -> Self {
        let mut by_date: BTreeMap<NaiveDate, &'a HealthLogEntry> = BTreeMap::new();
        for entry in entries {
            by_date.insert(entry.date, entry);
        }

        if by_date.len() < entries.len() {
            trace!(
                duplicates = entries.len() - by_date.len(),
                "Collapsed entries sharing a date"
            );
        }

        DailyLog {
            entries: by_date.into_values().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[&'a HealthLogEntry] {
        &self.entries
    }

    /// The most recent `days` entries, oldest first
    pub fn recent(&self, days: usize) -> &[&'a HealthLogEntry] {
        let start = self.entries.len().saturating_sub(days);
        &self.entries[start..]
    }

    pub fn series(&self, metric: Metric) -> MetricSeries {
        MetricSeriesExtractor::from_daily(self, metric)
    }
}

/// Builds a [`MetricSeries`] from raw log entries
pub struct MetricSeriesExtractor;

impl MetricSeriesExtractor {
    /// Extract one metric from entries in any order
    pub fn extract(entries: &[HealthLogEntry], metric: Metric) -> MetricSeries {
        Self::from_daily(&DailyLog::from_entries(entries), metric)
    }

    /// Extract every metric that has at least one valid observation
    pub fn extract_all(entries: &[HealthLogEntry]) -> BTreeMap<Metric, MetricSeries> {
        let daily = DailyLog::from_entries(entries);
        Metric::ALL
            .iter()
            .map(|&metric| (metric, daily.series(metric)))
            .filter(|(_, series)| !series.is_empty())
            .collect()
    }

    fn from_daily(daily: &DailyLog<'_>, metric: Metric) -> MetricSeries {
        let mut origin: Option<NaiveDate> = None;
        let mut points = Vec::new();

        for entry in daily.entries() {
            let Some(raw) = entry.value(metric) else {
                continue;
            };
            if !metric.is_valid(raw) {
                trace!(metric = metric.key(), date = %entry.date, value = raw, "Skipping out-of-domain value");
                continue;
            }

            let first = *origin.get_or_insert(entry.date);
            points.push(SeriesPoint {
                date: entry.date,
                day_offset: (entry.date - first).num_days(),
                value: raw,
            });
        }

        MetricSeries {
            metric,
            origin,
            points,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    #[test]
    fn test_extract_sorts_and_offsets_from_first_valid_entry() {
        let entries = vec![
            HealthLogEntry::new(day(7)).with(Metric::Sleep, 6.0),
            HealthLogEntry::new(day(3)).with(Metric::Sleep, 12.0), // out of domain
            HealthLogEntry::new(day(4)).with(Metric::Sleep, 7.0),
            HealthLogEntry::new(day(2)),
        ];

        let series = MetricSeriesExtractor::extract(&entries, Metric::Sleep);

        assert_eq!(series.origin, Some(day(4)));
        let offsets: Vec<i64> = series.points.iter().map(|p| p.day_offset).collect();
        assert_eq!(offsets, vec![0, 3]);
        assert_eq!(series.values(), vec![7.0, 6.0]);
    }

    #[test]
    fn test_metrics_have_independent_origins() {
        let entries = vec![
            HealthLogEntry::new(day(1)).with(Metric::Weight, 70.0),
            HealthLogEntry::new(day(2))
                .with(Metric::Weight, 70.2)
                .with(Metric::Steps, 4000.0),
        ];

        let all = MetricSeriesExtractor::extract_all(&entries);
        assert_eq!(all[&Metric::Weight].origin, Some(day(1)));
        assert_eq!(all[&Metric::Steps].origin, Some(day(2)));
        assert_eq!(all[&Metric::Steps].points[0].day_offset, 0);
        assert!(!all.contains_key(&Metric::Fatigue));
    }

    #[test]
    fn test_rejects_invalid_domains() {
        let entries = vec![
            HealthLogEntry::new(day(1)).with(Metric::Weight, 0.0),
            HealthLogEntry::new(day(2)).with(Metric::Steps, -20.0),
            HealthLogEntry::new(day(3)).with(Metric::Fatigue, f64::NAN),
        ];

        for metric in [Metric::Weight, Metric::Steps, Metric::Fatigue] {
            assert!(MetricSeriesExtractor::extract(&entries, metric).is_empty());
        }
    }

    #[test]
    fn test_duplicate_dates_keep_last_occurrence() {
        let entries = vec![
            HealthLogEntry::new(day(1)).with(Metric::Mood, 3.0),
            HealthLogEntry::new(day(1)).with(Metric::Mood, 8.0),
        ];

        let series = MetricSeriesExtractor::extract(&entries, Metric::Mood);
        assert_eq!(series.values(), vec![8.0]);
    }

    #[test]
    fn test_daily_log_recent_and_value_on() {
        let entries: Vec<HealthLogEntry> = (1..=5)
            .rev()
            .map(|d| HealthLogEntry::new(day(d)).with(Metric::Fatigue, d as f64))
            .collect();
        let daily = DailyLog::from_entries(&entries);

        let recent: Vec<NaiveDate> = daily.recent(2).iter().map(|e| e.date).collect();
        assert_eq!(recent, vec![day(4), day(5)]);
        assert_eq!(daily.recent(10).len(), 5);

        let series = daily.series(Metric::Fatigue);
        assert_eq!(series.value_on(day(3)), Some(3.0));
        assert_eq!(series.value_on(day(9)), None);
    }

    #[test]
    fn test_empty_input_gives_empty_series() {
        let series = MetricSeriesExtractor::extract(&[], Metric::Bpm);
        assert!(series.is_empty());
        assert_eq!(series.origin, None);
    }
}
