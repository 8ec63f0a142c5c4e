//! Flare-up risk scoring
//!
//! Builds the average profile of a few warning metrics over past flare days
//! and over calm days, then checks whether any of the most recent days sits
//! closer to the flare profile. Without calm history the recent days are
//! matched against the flare profile alone, within a fixed tolerance.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::error::{HealthTrendError, Result};
use crate::models::{FlareStatus, HealthLogEntry, Metric};
use crate::series::DailyLog;
use crate::stats;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlareRiskConfig {
    /// Metrics compared against the flare and calm profiles
    pub warning_metrics: Vec<Metric>,

    /// Number of most recent entries searched for a flare-like reading
    pub recent_days: usize,

    /// Distance from the flare profile that still matches when there are no calm days
    pub profile_tolerance: f64,

    /// Matching metrics needed for a high risk level
    pub high_threshold: usize,

    /// Matching metrics needed for a moderate risk level
    pub moderate_threshold: usize,
}

impl Default for FlareRiskConfig {
    fn default() -> Self {
        FlareRiskConfig {
            warning_metrics: vec![
                Metric::Fatigue,
                Metric::Stiffness,
                Metric::BackPain,
                Metric::Sleep,
                Metric::Swelling,
            ],
            recent_days: 3,
            profile_tolerance: 1.0,
            high_threshold: 4,
            moderate_threshold: 3,
        }
    }
}

impl FlareRiskConfig {
    pub fn validate(&self) -> Result<()> {
        if self.warning_metrics.is_empty() {
            return Err(HealthTrendError::invalid_argument(
                "warning_metrics must not be empty",
            ));
        }
        if self.recent_days == 0 {
            return Err(HealthTrendError::invalid_argument(
                "recent_days must be at least 1",
            ));
        }
        if !(self.profile_tolerance >= 0.0) {
            return Err(HealthTrendError::invalid_argument(
                "profile_tolerance must be non-negative",
            ));
        }
        if self.moderate_threshold > self.high_threshold {
            return Err(HealthTrendError::invalid_argument(
                "moderate_threshold cannot exceed high_threshold",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Moderate => write!(f, "moderate"),
            RiskLevel::High => write!(f, "high"),
        }
    }
}

/// Recent reading of one warning metric next to both profiles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileComparison {
    pub metric: Metric,
    /// Most flare-like reading over the recent days
    pub recent: f64,
    pub flare_average: f64,
    /// Absent when the log has no calm days
    #[serde(skip_serializing_if = "Option::is_none")]
    pub non_flare_average: Option<f64>,
    pub matches_flare: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlareRiskAssessment {
    pub level: RiskLevel,
    pub matching_metrics: usize,
    /// Warning metrics with a recent reading and the profile averages to compare it with
    pub total_criteria: usize,
    pub comparisons: Vec<ProfileComparison>,
}

#[derive(Debug, Clone, Default)]
pub struct FlareRiskScorer {
    config: FlareRiskConfig,
}

impl FlareRiskScorer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: FlareRiskConfig) -> Self {
        FlareRiskScorer { config }
    }

    /// Score the latest days of `log`
    ///
    /// A metric matches when one of its recent readings is strictly closer
    /// to the flare profile than to the calm profile, or lies within
    /// `profile_tolerance` of the flare profile when no day is labelled calm.
    /// Days without a flare label belong to neither profile.
    ///
    /// Returns `None` when the log holds no flare day.
    pub fn score(&self, log: &DailyLog<'_>) -> Option<FlareRiskAssessment> {
        let flare_days: Vec<&HealthLogEntry> = log
            .entries()
            .iter()
            .copied()
            .filter(|e| e.flare == Some(FlareStatus::Yes))
            .collect();
        let calm_days: Vec<&HealthLogEntry> = log
            .entries()
            .iter()
            .copied()
            .filter(|e| e.flare == Some(FlareStatus::No))
            .collect();

        if flare_days.is_empty() {
            return None;
        }

        let recent = log.recent(self.config.recent_days);
        let comparisons: Vec<ProfileComparison> = self
            .config
            .warning_metrics
            .iter()
            .filter_map(|&metric| {
                let flare_average = average(&flare_days, metric)?;
                let non_flare_average = if calm_days.is_empty() {
                    None
                } else {
                    Some(average(&calm_days, metric)?)
                };
                let recent = recent
                    .iter()
                    .filter_map(|e| e.valid_value(metric))
                    .min_by(|a, b| {
                        (a - flare_average)
                            .abs()
                            .total_cmp(&(b - flare_average).abs())
                    })?;

                let flare_distance = (recent - flare_average).abs();
                let matches_flare = match non_flare_average {
                    Some(calm) => flare_distance < (recent - calm).abs(),
                    None => flare_distance <= self.config.profile_tolerance,
                };

                Some(ProfileComparison {
                    metric,
                    recent,
                    flare_average,
                    non_flare_average,
                    matches_flare,
                })
            })
            .collect();

        let matching_metrics = comparisons.iter().filter(|c| c.matches_flare).count();
        let level = if matching_metrics >= self.config.high_threshold {
            RiskLevel::High
        } else if matching_metrics >= self.config.moderate_threshold {
            RiskLevel::Moderate
        } else {
            RiskLevel::Low
        };

        debug!(
            %level,
            matching_metrics,
            flare_days = flare_days.len(),
            calm_days = calm_days.len(),
            "Scored flare-up risk"
        );

        Some(FlareRiskAssessment {
            level,
            matching_metrics,
            total_criteria: comparisons.len(),
            comparisons,
        })
    }
}

fn average(entries: &[&HealthLogEntry], metric: Metric) -> Option<f64> {
    let values: Vec<f64> = entries
        .iter()
        .filter_map(|e| e.valid_value(metric))
        .collect();
    stats::mean(&values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Days, NaiveDate};

    fn day(i: u64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 4, 1).unwrap() + Days::new(i)
    }

    fn flare_day(i: u64) -> HealthLogEntry {
        HealthLogEntry::new(day(i))
            .with(Metric::Fatigue, 8.0)
            .with(Metric::Stiffness, 7.0)
            .with(Metric::BackPain, 8.0)
            .with(Metric::Sleep, 3.0)
            .with(Metric::Swelling, 6.0)
            .with_flare(true)
    }

    fn calm_day(i: u64) -> HealthLogEntry {
        HealthLogEntry::new(day(i))
            .with(Metric::Fatigue, 3.0)
            .with(Metric::Stiffness, 2.0)
            .with(Metric::BackPain, 2.0)
            .with(Metric::Sleep, 7.5)
            .with(Metric::Swelling, 1.0)
            .with_flare(false)
    }

    #[test]
    fn test_recent_day_matching_flare_profile_is_high_risk() {
        let mut entries: Vec<HealthLogEntry> = (0..10).map(calm_day).collect();
        entries.extend((10..15).map(flare_day));
        entries.extend((15..20).map(calm_day));
        entries.push(
            HealthLogEntry::new(day(20))
                .with(Metric::Fatigue, 8.0)
                .with(Metric::Stiffness, 7.0)
                .with(Metric::BackPain, 8.0)
                .with(Metric::Sleep, 3.0)
                .with(Metric::Swelling, 6.0),
        );

        let assessment = FlareRiskScorer::new()
            .score(&DailyLog::from_entries(&entries))
            .unwrap();

        assert_eq!(assessment.level, RiskLevel::High);
        assert_eq!(assessment.matching_metrics, 5);
        assert_eq!(assessment.total_criteria, 5);
    }

    #[test]
    fn test_calm_recent_days_are_low_risk() {
        let mut entries: Vec<HealthLogEntry> = (0..5).map(flare_day).collect();
        entries.extend((5..12).map(calm_day));

        let assessment = FlareRiskScorer::new()
            .score(&DailyLog::from_entries(&entries))
            .unwrap();
        assert_eq!(assessment.level, RiskLevel::Low);
        assert_eq!(assessment.matching_metrics, 0);
    }

    #[test]
    fn test_three_matches_is_moderate() {
        let mut entries: Vec<HealthLogEntry> = (0..4).map(flare_day).collect();
        entries.extend((4..8).map(calm_day));
        entries.push(
            HealthLogEntry::new(day(8))
                .with(Metric::Fatigue, 8.0)
                .with(Metric::Stiffness, 7.0)
                .with(Metric::BackPain, 8.0)
                .with(Metric::Sleep, 7.5)
                .with(Metric::Swelling, 1.0),
        );

        let assessment = FlareRiskScorer::new()
            .score(&DailyLog::from_entries(&entries))
            .unwrap();
        assert_eq!(assessment.matching_metrics, 3);
        assert_eq!(assessment.level, RiskLevel::Moderate);
    }

    #[test]
    fn test_no_assessment_without_flare_history() {
        let entries: Vec<HealthLogEntry> = (0..6).map(calm_day).collect();
        assert!(FlareRiskScorer::new()
            .score(&DailyLog::from_entries(&entries))
            .is_none());
    }

    #[test]
    fn test_single_flare_like_day_among_recent_days_matches() {
        let mut entries: Vec<HealthLogEntry> = (0..5).map(flare_day).collect();
        entries.extend((5..15).map(calm_day));
        let mut today = flare_day(15);
        today.flare = None;
        entries.push(today);

        let assessment = FlareRiskScorer::new()
            .score(&DailyLog::from_entries(&entries))
            .unwrap();
        assert_eq!(assessment.level, RiskLevel::High);
        assert_eq!(assessment.matching_metrics, 5);

        let fatigue = &assessment.comparisons[0];
        assert_eq!(fatigue.metric, Metric::Fatigue);
        assert_eq!(fatigue.recent, 8.0);
        assert_eq!(fatigue.non_flare_average, Some(3.0));
    }

    #[test]
    fn test_without_calm_days_matches_flare_profile_within_tolerance() {
        let mut entries: Vec<HealthLogEntry> = (0..5).map(flare_day).collect();
        entries.push(
            HealthLogEntry::new(day(5))
                .with(Metric::Fatigue, 7.5)
                .with(Metric::Stiffness, 7.0)
                .with(Metric::BackPain, 8.5)
                .with(Metric::Sleep, 3.0)
                .with(Metric::Swelling, 2.0),
        );
        // only the unlabelled day is recent
        let scorer = FlareRiskScorer::with_config(FlareRiskConfig {
            recent_days: 1,
            ..FlareRiskConfig::default()
        });

        let assessment = scorer.score(&DailyLog::from_entries(&entries)).unwrap();
        assert_eq!(assessment.matching_metrics, 4);
        assert_eq!(assessment.level, RiskLevel::High);
        assert!(assessment
            .comparisons
            .iter()
            .all(|c| c.non_flare_average.is_none()));
    }

    #[test]
    fn test_invalid_tolerance_is_rejected() {
        let config = FlareRiskConfig {
            profile_tolerance: -0.5,
            ..FlareRiskConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_metrics_missing_from_a_profile_are_not_counted() {
        let mut entries = vec![flare_day(0), calm_day(1)];
        entries[1].set_value(Metric::Swelling, None);

        let assessment = FlareRiskScorer::new()
            .score(&DailyLog::from_entries(&entries))
            .unwrap();
        assert_eq!(assessment.total_criteria, 4);
        assert!(assessment
            .comparisons
            .iter()
            .all(|c| c.metric != Metric::Swelling));
    }
}
