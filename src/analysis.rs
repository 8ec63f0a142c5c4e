//! End-to-end analysis of a health log
//!
//! [`HealthAnalyzer`] is the local statistical engine. It fits trend models
//! on the training logs and summarises the reporting window: descriptive
//! statistics, correlations, flare-up risk and anomaly findings.
//! [`AnalysisOrchestrator`] is the entry point callers use; it can delegate
//! to an injected [`AnalysisProvider`] and falls back to the local engine
//! whenever that provider is missing or fails.

use chrono::{Days, NaiveDate};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::anomaly::{AnomalyDetector, AnomalyFinding};
use crate::config::AnalysisConfig;
use crate::correlation::{CorrelationCluster, CorrelationEngine, CorrelationMatrix};
use crate::error::Result;
use crate::flare::{FlareRiskAssessment, FlareRiskScorer};
use crate::forecast::{MetricContext, Prediction};
use crate::models::{HealthLogEntry, Metric};
use crate::series::{DailyLog, MetricSeries, MetricSeriesExtractor};
use crate::trend::{TrendModel, TrendModelFitter};

/// Name reported in [`AnalysisResult::source`] for the local engine
pub const LOCAL_SOURCE: &str = "local";

/// Complete analysis of one reporting window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    /// One entry per metric observed in the window
    pub trends: BTreeMap<Metric, TrendModel>,
    pub correlation_matrix: CorrelationMatrix,
    pub correlation_clusters: Vec<CorrelationCluster>,
    pub flare_up_risk: Option<FlareRiskAssessment>,
    pub anomalies: Vec<AnomalyFinding>,
    /// Which provider produced the result
    pub source: String,
}

impl AnalysisResult {
    fn empty(source: &str) -> Self {
        AnalysisResult {
            trends: BTreeMap::new(),
            correlation_matrix: CorrelationMatrix::default(),
            correlation_clusters: Vec::new(),
            flare_up_risk: None,
            anomalies: Vec::new(),
            source: source.to_string(),
        }
    }
}

/// Forecast of one metric from its training history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricForecast {
    pub metric: Metric,
    /// Date of day offset 0
    pub origin: NaiveDate,
    pub model: TrendModel,
    pub predictions: Vec<Prediction>,
}

impl MetricForecast {
    /// Calendar date of a prediction
    pub fn date_of(&self, prediction: &Prediction) -> Option<NaiveDate> {
        let offset = u64::try_from(prediction.day_offset).ok()?;
        self.origin.checked_add_days(Days::new(offset))
    }
}

/// A source of analysis results
///
/// Implementations must be pure: identical inputs give identical results.
pub trait AnalysisProvider: Send + Sync {
    fn name(&self) -> &str;

    fn analyze(
        &self,
        window_logs: &[HealthLogEntry],
        training_logs: &[HealthLogEntry],
    ) -> Result<AnalysisResult>;
}

/// The local statistical engine
#[derive(Debug, Clone)]
pub struct HealthAnalyzer {
    config: AnalysisConfig,
    fitter: TrendModelFitter,
    correlation: CorrelationEngine,
    flare_risk: FlareRiskScorer,
    anomaly: AnomalyDetector,
}

impl HealthAnalyzer {
    pub fn new() -> Self {
        Self::build(AnalysisConfig::default())
    }

    /// Create an analyzer, rejecting invalid thresholds
    pub fn with_config(config: AnalysisConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: AnalysisConfig) -> Self {
        HealthAnalyzer {
            fitter: TrendModelFitter::with_config(
                config.model_selection.clone(),
                config.forecast.clone(),
            ),
            correlation: CorrelationEngine::with_config(config.correlation.clone()),
            flare_risk: FlareRiskScorer::with_config(config.flare_risk.clone()),
            anomaly: AnomalyDetector::with_config(config.anomaly.clone()),
            config,
        }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Analyse `window_logs`, fitting models on `training_logs`
    ///
    /// Metrics with no training data are fitted on the window instead.
    /// Neither slice needs to be sorted.
    pub fn analyze(
        &self,
        window_logs: &[HealthLogEntry],
        training_logs: &[HealthLogEntry],
    ) -> AnalysisResult {
        let window = DailyLog::from_entries(window_logs);
        if window.is_empty() {
            info!("Empty reporting window, nothing to analyse");
            return AnalysisResult::empty(LOCAL_SOURCE);
        }
        let training = DailyLog::from_entries(training_logs);

        let window_series: BTreeMap<Metric, MetricSeries> = Metric::ALL
            .iter()
            .map(|&metric| (metric, window.series(metric)))
            .filter(|(_, series)| !series.is_empty())
            .collect();

        let fit = |(&metric, recent): (&Metric, &MetricSeries)| {
            let history = training.series(metric);
            let basis = if history.is_empty() { recent } else { &history };
            let model = self.fitter.fit(basis)?;
            Some((metric, self.fitter.apply_window(model, recent)))
        };

        let trends: BTreeMap<Metric, TrendModel> = if self.config.parallel {
            window_series
                .par_iter()
                .filter_map(fit)
                .collect::<Vec<_>>()
                .into_iter()
                .collect()
        } else {
            window_series.iter().filter_map(fit).collect()
        };

        let correlation_matrix = self.correlation.compute_correlation_matrix(&window_series);
        let correlation_clusters = self.correlation.clusters(&correlation_matrix);
        let flare_up_risk = self.flare_risk.score(&window);
        let anomalies = self.anomaly.detect(&window);

        info!(
            window_days = window.len(),
            training_days = training.len(),
            metrics = trends.len(),
            clusters = correlation_clusters.len(),
            anomalies = anomalies.len(),
            "Analysis complete"
        );

        AnalysisResult {
            trends,
            correlation_matrix,
            correlation_clusters,
            flare_up_risk,
            anomalies,
            source: LOCAL_SOURCE.to_string(),
        }
    }

    /// Forecast `days` days past the last training observation
    ///
    /// Uses the configured default confidence level when `confidence_level`
    /// is `None`. Returns `Ok(None)` when the metric has no valid data.
    pub fn forecast(
        &self,
        training_logs: &[HealthLogEntry],
        metric: Metric,
        days: usize,
        confidence_level: Option<f64>,
    ) -> Result<Option<MetricForecast>> {
        let level = confidence_level.unwrap_or(self.config.forecast.default_confidence_level);
        let series = MetricSeriesExtractor::extract(training_logs, metric);
        let (Some(origin), Some(model)) = (series.origin, self.fitter.fit(&series)) else {
            return Ok(None);
        };

        let values = series.values();
        let context = MetricContext::new(metric, &values);
        let predictions = self.fitter.forecaster().predict_future_values_with_confidence(
            &model,
            model.last_x,
            days,
            &context,
            level,
        )?;

        Ok(Some(MetricForecast {
            metric,
            origin,
            model,
            predictions,
        }))
    }
}

impl Default for HealthAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalysisProvider for HealthAnalyzer {
    fn name(&self) -> &str {
        LOCAL_SOURCE
    }

    fn analyze(
        &self,
        window_logs: &[HealthLogEntry],
        training_logs: &[HealthLogEntry],
    ) -> Result<AnalysisResult> {
        Ok(HealthAnalyzer::analyze(self, window_logs, training_logs))
    }
}

/// Entry point for analyses
///
/// Calls the injected provider when one is set and uses the local engine
/// otherwise or when the provider returns an error.
pub struct AnalysisOrchestrator {
    local: HealthAnalyzer,
    provider: Option<Box<dyn AnalysisProvider>>,
}

impl AnalysisOrchestrator {
    pub fn new(config: AnalysisConfig) -> Result<Self> {
        Ok(AnalysisOrchestrator {
            local: HealthAnalyzer::with_config(config)?,
            provider: None,
        })
    }

    pub fn with_provider(mut self, provider: Box<dyn AnalysisProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn local(&self) -> &HealthAnalyzer {
        &self.local
    }

    pub fn analyze(
        &self,
        window_logs: &[HealthLogEntry],
        training_logs: &[HealthLogEntry],
    ) -> AnalysisResult {
        if let Some(provider) = &self.provider {
            match provider.analyze(window_logs, training_logs) {
                Ok(result) => return result,
                Err(e) => warn!(
                    provider = provider.name(),
                    error = %e,
                    "Analysis provider failed, using local engine"
                ),
            }
        }

        self.local.analyze(window_logs, training_logs)
    }

    pub fn forecast(
        &self,
        training_logs: &[HealthLogEntry],
        metric: Metric,
        days: usize,
        confidence_level: Option<f64>,
    ) -> Result<Option<MetricForecast>> {
        self.local
            .forecast(training_logs, metric, days, confidence_level)
    }
}

impl Default for AnalysisOrchestrator {
    fn default() -> Self {
        AnalysisOrchestrator {
            local: HealthAnalyzer::new(),
            provider: None,
        }
    }
}

impl std::fmt::Debug for AnalysisOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisOrchestrator")
            .field("local", &self.local)
            .field("provider", &self.provider.as_ref().map(|p| p.name()))
            .finish()
    }
}
