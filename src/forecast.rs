//! Forecasting from fitted trend models
//!
//! Point forecasts come straight from the model: linear and polynomial models
//! are evaluated at future day offsets, AR(1) models add a damped residual to
//! their trend line. Every returned value is clamped into the metric's domain
//! and rounded to its display precision.
//!
//! When a model would forecast a perfectly flat line although the training
//! data varied, the forecaster overlays a decaying echo of the most recent
//! deviations so the dashboard does not show a constant where the history
//! clearly moves. The overlay is deterministic.

use serde::{Deserialize, Serialize};

use crate::error::{HealthTrendError, Result};
use crate::models::Metric;
use crate::stats::{self, EPSILON};
use crate::trend::{ModelParameters, TrendModel};

/// Forecast tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastConfig {
    /// Horizon of the summary projection stored on each trend model
    pub projection_days: usize,

    /// Confidence level used when the caller does not pick one
    pub default_confidence_level: f64,

    /// Per-step decay applied on top of the AR coefficient
    pub ar_damping: f64,

    /// Spread below which a forecast counts as flat
    pub flat_spread_tolerance: f64,

    /// Number of recent deviations from the training average replayed over a flat forecast
    pub flat_echo_window: usize,

    /// Scale of the replayed deviations
    pub flat_echo_amplitude: f64,

    /// Per-day decay of the replayed deviations
    pub flat_echo_decay: f64,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        ForecastConfig {
            projection_days: 7,
            default_confidence_level: 0.95,
            ar_damping: 0.9,
            flat_spread_tolerance: 1e-6,
            flat_echo_window: 7,
            flat_echo_amplitude: 0.5,
            flat_echo_decay: 0.85,
        }
    }
}

impl ForecastConfig {
    pub fn validate(&self) -> Result<()> {
        if self.projection_days == 0 {
            return Err(HealthTrendError::invalid_argument(
                "projection_days must be at least 1",
            ));
        }
        if !(self.default_confidence_level > 0.0 && self.default_confidence_level < 1.0) {
            return Err(HealthTrendError::invalid_argument(
                "default_confidence_level must be in (0, 1)",
            ));
        }
        for (name, value) in [
            ("ar_damping", self.ar_damping),
            ("flat_echo_decay", self.flat_echo_decay),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(HealthTrendError::invalid_argument(format!(
                    "{} must be in [0, 1]",
                    name
                )));
            }
        }
        if self.flat_echo_amplitude < 0.0 {
            return Err(HealthTrendError::invalid_argument(
                "flat_echo_amplitude must be non-negative",
            ));
        }
        Ok(())
    }
}

/// Training-data context a forecast is produced for
#[derive(Debug, Clone, Copy)]
pub struct MetricContext<'a> {
    pub metric: Metric,
    /// Mean of the training values
    pub average: f64,
    /// Population variance of the training values
    pub variance: f64,
    /// Training values, oldest first
    pub training_values: &'a [f64],
}

impl<'a> MetricContext<'a> {
    pub fn new(metric: Metric, training_values: &'a [f64]) -> Self {
        MetricContext {
            metric,
            average: stats::mean(training_values).unwrap_or_default(),
            variance: stats::population_variance(training_values).unwrap_or_default(),
            training_values,
        }
    }
}

/// One forecast day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    pub day_offset: i64,
    pub point_estimate: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lower_bound: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upper_bound: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_level: Option<f64>,
}

/// Produces point forecasts and prediction intervals
#[derive(Debug, Clone, Default)]
pub struct Forecaster {
    config: ForecastConfig,
}

impl Forecaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ForecastConfig) -> Self {
        Forecaster { config }
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    /// Forecast `days` values for offsets `last_x + 1 ..= last_x + days`
    pub fn predict_future_values(
        &self,
        model: &TrendModel,
        last_x: i64,
        days: usize,
        context: &MetricContext<'_>,
    ) -> Result<Vec<Prediction>> {
        Self::check_context(model, context)?;

        let metric = model.metric;
        let predictions = self
            .raw_forecast(model, last_x, days, context)
            .into_iter()
            .zip(1..)
            .map(|(value, h)| Prediction {
                day_offset: last_x + h,
                point_estimate: metric.clamp_and_round(value),
                lower_bound: None,
                upper_bound: None,
                confidence_level: None,
            })
            .collect();

        Ok(predictions)
    }

    /// Forecast with symmetric prediction intervals around each point
    ///
    /// Bounds are omitted when the model has no standard error. The
    /// half-width is rounded up to display precision, so interval widths
    /// never shrink through rounding.
    pub fn predict_future_values_with_confidence(
        &self,
        model: &TrendModel,
        last_x: i64,
        days: usize,
        context: &MetricContext<'_>,
        confidence_level: f64,
    ) -> Result<Vec<Prediction>> {
        check_confidence_level(confidence_level)?;

        let metric = model.metric;
        let mut predictions = self.predict_future_values(model, last_x, days, context)?;

        for prediction in &mut predictions {
            let Some(half_width) =
                self.interval_half_width(model, prediction.day_offset, confidence_level)?
            else {
                continue;
            };

            let width = metric.round_width_up(half_width);
            prediction.lower_bound = Some(metric.clamp_and_round(prediction.point_estimate - width));
            prediction.upper_bound = Some(metric.clamp_and_round(prediction.point_estimate + width));
            prediction.confidence_level = Some(confidence_level);
        }

        Ok(predictions)
    }

    /// Unrounded prediction-interval half-width at day offset `x`
    ///
    /// `None` when the model carries no standard error.
    pub fn interval_half_width(
        &self,
        model: &TrendModel,
        x: i64,
        confidence_level: f64,
    ) -> Result<Option<f64>> {
        check_confidence_level(confidence_level)?;

        let Some(se) = model.standard_error else {
            return Ok(None);
        };
        let df = model.diagnostics.residual_df;
        if df == 0 {
            return Ok(None);
        }
        let t = stats::t_critical(confidence_level, df)?;
        let n = model.fitted_size as f64;

        let half_width = match &model.parameters {
            ModelParameters::Constant { .. } => return Ok(None),
            ModelParameters::Linear { .. } | ModelParameters::Polynomial { .. } => {
                let d = &model.diagnostics;
                let leverage = if d.sxx > EPSILON {
                    (x as f64 - d.x_mean).powi(2) / d.sxx
                } else {
                    0.0
                };
                se * t * (1.0 + 1.0 / n + leverage).sqrt()
            }
            ModelParameters::Autoregressive { phi, .. } => {
                // variance of the h-step AR(1) forecast error
                let h = (x - model.last_x).max(1);
                let factor: f64 = (0..h).map(|k| phi.powi(2 * k as i32)).sum();
                se * t * factor.sqrt()
            }
        };

        Ok(Some(half_width))
    }

    /// Value `projection_days` after the last fitted point, clamped and rounded
    pub fn project(&self, model: &TrendModel, context: &MetricContext<'_>) -> f64 {
        let days = self.config.projection_days.max(1);
        let raw = self.raw_forecast(model, model.last_x, days, context);
        let value = raw.last().copied().unwrap_or(model.current);
        model.metric.clamp_and_round(value)
    }

    fn check_context(model: &TrendModel, context: &MetricContext<'_>) -> Result<()> {
        if model.metric != context.metric {
            return Err(HealthTrendError::invalid_argument(format!(
                "forecast context is for {} but the model is for {}",
                context.metric.key(),
                model.metric.key()
            )));
        }
        Ok(())
    }

    fn raw_forecast(
        &self,
        model: &TrendModel,
        last_x: i64,
        days: usize,
        context: &MetricContext<'_>,
    ) -> Vec<f64> {
        let offsets = (1..=days as i64).map(|h| last_x + h);

        let mut values: Vec<f64> = match &model.parameters {
            ModelParameters::Constant { level } => vec![*level; days],
            ModelParameters::Linear { slope, intercept } => offsets
                .map(|x| intercept + slope * x as f64)
                .collect(),
            ModelParameters::Polynomial {
                coefficients: [c0, c1, c2],
                x_center,
            } => offsets
                .map(|x| {
                    let u = x as f64 - x_center;
                    c0 + c1 * u + c2 * u * u
                })
                .collect(),
            ModelParameters::Autoregressive {
                phi,
                trend_slope,
                trend_intercept,
                last_residual,
            } => {
                let mut residual = *last_residual;
                let mut step = 0i64;
                offsets
                    .map(|x| {
                        let h = x - model.last_x;
                        if h <= 0 {
                            return trend_intercept + trend_slope * x as f64;
                        }
                        while step < h {
                            residual *= phi * self.config.ar_damping.powi(step as i32);
                            step += 1;
                        }
                        trend_intercept + trend_slope * x as f64 + residual
                    })
                    .collect()
            }
        };

        self.adjust_flat(&mut values, context);
        values
    }

    /// Overlay a decaying echo of recent deviations on a flat forecast
    fn adjust_flat(&self, values: &mut [f64], context: &MetricContext<'_>) {
        if values.len() < 2 || context.variance <= EPSILON {
            return;
        }

        let (min, max) = values
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(*v), hi.max(*v))
            });
        if max - min > self.config.flat_spread_tolerance {
            return;
        }

        let history = context.training_values;
        let window = &history[history.len().saturating_sub(self.config.flat_echo_window)..];
        let deviations: Vec<f64> = window.iter().map(|v| v - context.average).collect();
        if deviations.iter().all(|d| d.abs() <= EPSILON) {
            return;
        }

        let mut weight = self.config.flat_echo_amplitude;
        for (value, deviation) in values.iter_mut().zip(deviations.iter().cycle()) {
            *value += weight * deviation;
            weight *= self.config.flat_echo_decay;
        }
    }
}

fn check_confidence_level(confidence_level: f64) -> Result<()> {
    if confidence_level > 0.0 && confidence_level < 1.0 {
        Ok(())
    } else {
        Err(HealthTrendError::invalid_argument(format!(
            "confidence level must be in (0, 1), got {}",
            confidence_level
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::HealthLogEntry;
    use crate::series::MetricSeriesExtractor;
    use crate::trend::{ModelType, TrendModelFitter};
    use chrono::{Days, NaiveDate};
    use proptest::prelude::*;

    fn fit(metric: Metric, values: &[f64]) -> (TrendModel, Vec<f64>) {
        let start = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let entries: Vec<HealthLogEntry> = values
            .iter()
            .enumerate()
            .map(|(i, v)| HealthLogEntry::new(start + Days::new(i as u64)).with(metric, *v))
            .collect();
        let series = MetricSeriesExtractor::extract(&entries, metric);
        let model = TrendModelFitter::new().fit(&series).unwrap();
        (model, series.values())
    }

    #[test]
    fn test_linear_forecast_continues_the_line() {
        let (model, values) = fit(Metric::Fatigue, &[1.0, 2.0, 3.0, 4.0]);
        let context = MetricContext::new(Metric::Fatigue, &values);
        let predictions = Forecaster::new()
            .predict_future_values(&model, model.last_x, 3, &context)
            .unwrap();

        let points: Vec<f64> = predictions.iter().map(|p| p.point_estimate).collect();
        assert_eq!(points, vec![5.0, 6.0, 7.0]);
        assert_eq!(predictions[0].day_offset, 4);
        assert!(predictions.iter().all(|p| p.lower_bound.is_none()));
    }

    #[test]
    fn test_forecast_is_clamped_into_domain() {
        let (model, values) = fit(Metric::BackPain, &[6.0, 7.0, 8.0, 9.0]);
        let context = MetricContext::new(Metric::BackPain, &values);
        let predictions = Forecaster::new()
            .predict_future_values_with_confidence(&model, model.last_x, 5, &context, 0.95)
            .unwrap();

        for p in &predictions {
            assert!(p.point_estimate <= 10.0);
            assert!(p.upper_bound.unwrap() <= 10.0);
        }
    }

    #[test]
    fn test_integer_metrics_are_rounded() {
        let (model, values) = fit(Metric::Bpm, &[60.0, 61.5, 62.0, 64.3]);
        let context = MetricContext::new(Metric::Bpm, &values);
        let predictions = Forecaster::new()
            .predict_future_values(&model, model.last_x, 4, &context)
            .unwrap();
        assert!(predictions.iter().all(|p| p.point_estimate.fract() == 0.0));
    }

    #[test]
    fn test_bounds_omitted_without_standard_error() {
        let (model, values) = fit(Metric::BackPain, &[3.0, 8.0]);
        let context = MetricContext::new(Metric::BackPain, &values);
        let predictions = Forecaster::new()
            .predict_future_values_with_confidence(&model, model.last_x, 3, &context, 0.9)
            .unwrap();

        assert_eq!(predictions.len(), 3);
        assert!(predictions.iter().all(|p| p.lower_bound.is_none() && p.upper_bound.is_none()));
    }

    #[test]
    fn test_invalid_confidence_level_is_rejected() {
        let (model, values) = fit(Metric::Sleep, &[6.0, 7.0, 6.5, 7.5]);
        let context = MetricContext::new(Metric::Sleep, &values);
        let forecaster = Forecaster::new();

        for level in [0.0, 1.0, -0.2, 1.5] {
            let err = forecaster
                .predict_future_values_with_confidence(&model, model.last_x, 3, &context, level)
                .unwrap_err();
            assert!(matches!(err, HealthTrendError::InvalidArgument(_)));
        }
    }

    #[test]
    fn test_mismatched_context_is_rejected() {
        let (model, values) = fit(Metric::Sleep, &[6.0, 7.0, 6.5]);
        let context = MetricContext::new(Metric::Mood, &values);
        assert!(Forecaster::new()
            .predict_future_values(&model, model.last_x, 3, &context)
            .is_err());
    }

    #[test]
    fn test_linear_interval_widens_with_horizon() {
        let (model, values) = fit(Metric::Mood, &[5.0, 6.2, 5.8, 6.9, 6.1, 7.4, 6.8]);
        assert_eq!(model.model_type, ModelType::Linear);
        let context = MetricContext::new(Metric::Mood, &values);
        let forecaster = Forecaster::new();

        let widths: Vec<f64> = (1..=10)
            .map(|h| {
                forecaster
                    .interval_half_width(&model, model.last_x + h, 0.95)
                    .unwrap()
                    .unwrap()
            })
            .collect();
        assert!(widths.windows(2).all(|w| w[1] >= w[0]));

        let predictions = forecaster
            .predict_future_values_with_confidence(&model, model.last_x, 3, &context, 0.95)
            .unwrap();
        assert!(predictions.iter().all(|p| p.confidence_level == Some(0.95)));
    }

    #[test]
    fn test_published_interval_width_never_shrinks() {
        let (model, values) = fit(Metric::Fatigue, &[4.0, 4.6, 4.2, 4.9, 4.5, 5.1, 4.8, 5.4]);
        assert_eq!(model.model_type, ModelType::Linear);
        let context = MetricContext::new(Metric::Fatigue, &values);

        let predictions = Forecaster::new()
            .predict_future_values_with_confidence(&model, model.last_x, 7, &context, 0.95)
            .unwrap();

        let widths: Vec<f64> = predictions
            .iter()
            .map(|p| {
                let (lower, upper) = (p.lower_bound.unwrap(), p.upper_bound.unwrap());
                assert!(lower > 0.0 && upper < 10.0, "bound clamped at {:?}", p);
                upper - lower
            })
            .collect();
        assert!(widths.windows(2).all(|w| w[1] >= w[0] - 1e-9));
    }

    #[test]
    fn test_flat_echo_is_measured_from_training_average() {
        let values = [4.0, 6.0, 4.0, 6.0, 4.0];
        let (mut model, history) = fit(Metric::Fatigue, &values);
        model.parameters = ModelParameters::Linear {
            slope: 0.0,
            intercept: 5.0,
        };
        let context = MetricContext::new(Metric::Fatigue, &history);
        assert!((context.average - 4.8).abs() < 1e-12);

        let predictions = Forecaster::new()
            .predict_future_values(&model, model.last_x, 2, &context)
            .unwrap();
        // 5.0 + 0.5 * (4.0 - 4.8), then 5.0 + 0.425 * (6.0 - 4.8)
        assert_eq!(predictions[0].point_estimate, 4.6);
        assert_eq!(predictions[1].point_estimate, 5.5);
    }

    #[test]
    fn test_flat_forecast_gets_echo_of_recent_history() {
        // symmetric zig-zag: the least-squares slope is exactly zero
        let values = [4.0, 6.0, 4.0, 6.0, 4.0];
        let (mut model, history) = fit(Metric::Fatigue, &values);
        model.parameters = ModelParameters::Linear {
            slope: 0.0,
            intercept: 5.0,
        };
        let context = MetricContext::new(Metric::Fatigue, &history);

        let predictions = Forecaster::new()
            .predict_future_values(&model, model.last_x, 4, &context)
            .unwrap();
        let points: Vec<f64> = predictions.iter().map(|p| p.point_estimate).collect();
        let spread = points.iter().cloned().fold(f64::NEG_INFINITY, f64::max)
            - points.iter().cloned().fold(f64::INFINITY, f64::min);
        assert!(spread > 0.0);
    }

    #[test]
    fn test_constant_history_stays_flat() {
        let (model, values) = fit(Metric::Sleep, &[7.0; 14]);
        let context = MetricContext::new(Metric::Sleep, &values);
        let predictions = Forecaster::new()
            .predict_future_values(&model, model.last_x, 7, &context)
            .unwrap();
        assert!(predictions.iter().all(|p| p.point_estimate == 7.0));
    }

    #[test]
    fn test_autoregressive_forecast_decays_toward_trend() {
        let values: Vec<f64> = (0..40)
            .map(|t| 5.0 + 3.0 * (2.0 * std::f64::consts::PI * t as f64 / 20.0).sin())
            .collect();
        let (model, history) = fit(Metric::Mood, &values);
        assert_eq!(model.model_type, ModelType::Autoregressive);
        let context = MetricContext::new(Metric::Mood, &history);

        let predictions = Forecaster::new()
            .predict_future_values_with_confidence(&model, model.last_x, 30, &context, 0.95)
            .unwrap();
        let far = predictions.last().unwrap();
        let trend = model.intercept + model.slope * far.day_offset as f64;
        assert!((far.point_estimate - trend).abs() < 0.2);
        assert!(far.upper_bound.unwrap() >= far.point_estimate);
    }

    proptest! {
        #[test]
        fn prop_forecasts_stay_in_domain_and_bracketed(
            values in prop::collection::vec(0.0f64..=10.0, 3..25),
            days in 1usize..20,
            level in 0.5f64..0.99,
        ) {
            let (model, history) = fit(Metric::Stiffness, &values);
            let context = MetricContext::new(Metric::Stiffness, &history);
            let predictions = Forecaster::new()
                .predict_future_values_with_confidence(&model, model.last_x, days, &context, level)
                .unwrap();

            prop_assert_eq!(predictions.len(), days);
            for p in &predictions {
                prop_assert!((0.0..=10.0).contains(&p.point_estimate));
                if let (Some(lo), Some(hi)) = (p.lower_bound, p.upper_bound) {
                    prop_assert!(lo <= p.point_estimate && p.point_estimate <= hi);
                    prop_assert!(lo >= 0.0 && hi <= 10.0);
                }
            }
        }
    }
}
