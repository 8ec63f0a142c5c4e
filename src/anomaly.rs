//! Frequency-based anomaly rules over a reporting window

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{HealthTrendError, Result};
use crate::models::Metric;
use crate::series::DailyLog;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyConfig {
    /// Windows shorter than this are not evaluated
    pub min_days: usize,

    /// Flare days over logged days above which a finding is raised
    pub flare_ratio_threshold: f64,

    /// Share of severe days above which a metric finding is raised
    pub severe_ratio_threshold: f64,

    /// Values at or above this are severe for `bad_high_metrics`
    pub severe_high_value: f64,

    /// Values at or below this are severe for `bad_low_metrics`
    pub severe_low_value: f64,

    pub bad_high_metrics: Vec<Metric>,
    pub bad_low_metrics: Vec<Metric>,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        AnomalyConfig {
            min_days: 3,
            flare_ratio_threshold: 0.35,
            severe_ratio_threshold: 0.3,
            severe_high_value: 8.0,
            severe_low_value: 2.0,
            bad_high_metrics: vec![
                Metric::Fatigue,
                Metric::Stiffness,
                Metric::BackPain,
                Metric::JointPain,
                Metric::Swelling,
                Metric::Irritability,
                Metric::WeatherSensitivity,
            ],
            bad_low_metrics: vec![
                Metric::Sleep,
                Metric::Mobility,
                Metric::DailyFunction,
                Metric::Mood,
            ],
        }
    }
}

impl AnomalyConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, ratio) in [
            ("flare_ratio_threshold", self.flare_ratio_threshold),
            ("severe_ratio_threshold", self.severe_ratio_threshold),
        ] {
            if !(0.0..1.0).contains(&ratio) {
                return Err(HealthTrendError::invalid_argument(format!(
                    "{} must be in [0, 1)",
                    name
                )));
            }
        }
        if self.min_days == 0 {
            return Err(HealthTrendError::invalid_argument(
                "min_days must be at least 1",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "metric", rename_all = "camelCase")]
pub enum AnomalyKind {
    FlareFrequency,
    SevereHigh(Metric),
    SevereLow(Metric),
}

/// One fired rule with the exact counts behind it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyFinding {
    pub kind: AnomalyKind,
    pub count: usize,
    pub total: usize,
    pub ratio: f64,
    pub message: String,
}

impl AnomalyFinding {
    fn new(kind: AnomalyKind, count: usize, total: usize, subject: String) -> Self {
        let ratio = count as f64 / total as f64;
        AnomalyFinding {
            kind,
            count,
            total,
            ratio,
            message: format!(
                "{} on {} of {} days ({:.1}%)",
                subject,
                count,
                total,
                ratio * 100.0
            ),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AnomalyDetector {
    config: AnomalyConfig,
}

impl AnomalyDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: AnomalyConfig) -> Self {
        AnomalyDetector { config }
    }

    /// Evaluate every rule in a fixed order: flare frequency, then each
    /// bad-high metric, then each bad-low metric
    pub fn detect(&self, window: &DailyLog<'_>) -> Vec<AnomalyFinding> {
        let total_days = window.len();
        if total_days < self.config.min_days {
            return Vec::new();
        }

        let mut findings = Vec::new();

        let flare_days = window.entries().iter().filter(|e| e.is_flare()).count();
        if flare_days as f64 / total_days as f64 > self.config.flare_ratio_threshold {
            findings.push(AnomalyFinding::new(
                AnomalyKind::FlareFrequency,
                flare_days,
                total_days,
                "Flare-ups".to_string(),
            ));
        }

        for &metric in &self.config.bad_high_metrics {
            let threshold = self.config.severe_high_value;
            if let Some((count, total)) = self.severe_frequency(window, metric, |v| v >= threshold) {
                findings.push(AnomalyFinding::new(
                    AnomalyKind::SevereHigh(metric),
                    count,
                    total,
                    format!("{} at {}/10 or higher", metric.label(), threshold),
                ));
            }
        }

        for &metric in &self.config.bad_low_metrics {
            let threshold = self.config.severe_low_value;
            if let Some((count, total)) = self.severe_frequency(window, metric, |v| v <= threshold) {
                findings.push(AnomalyFinding::new(
                    AnomalyKind::SevereLow(metric),
                    count,
                    total,
                    format!("{} at {}/10 or lower", metric.label(), threshold),
                ));
            }
        }

        debug!(findings = findings.len(), days = total_days, "Anomaly scan complete");
        findings
    }

    /// Severe days and days that recorded the metric, when the share is too high
    fn severe_frequency(
        &self,
        window: &DailyLog<'_>,
        metric: Metric,
        is_severe: impl Fn(f64) -> bool,
    ) -> Option<(usize, usize)> {
        let values: Vec<f64> = window
            .entries()
            .iter()
            .filter_map(|e| e.valid_value(metric))
            .collect();
        if values.is_empty() {
            return None;
        }

        let count = values.iter().filter(|v| is_severe(**v)).count();
        if count as f64 / values.len() as f64 > self.config.severe_ratio_threshold {
            Some((count, values.len()))
        } else {
            None
        }
    }
}
