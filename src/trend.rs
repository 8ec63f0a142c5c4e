//! Trend model fitting
//!
//! Fits one predictive model per metric series and summarises it for the
//! dashboard. Model selection is deterministic given the series:
//!
//! - fewer than 10 points: ordinary least-squares line
//! - 10 to 29 points where a parabola cuts the adjusted residual error by at
//!   least 10%: degree-2 polynomial
//! - 10 or more points with a weak linear trend but strong lag-1 dependence
//!   in the detrended residuals: AR(1) around a drifting trend line
//! - otherwise: the least-squares line
//!
//! Every threshold lives in [`ModelSelectionConfig`] and is a tuning knob,
//! not a statistical law.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{HealthTrendError, Result};
use crate::forecast::{ForecastConfig, Forecaster, MetricContext};
use crate::models::{Metric, Polarity, TrendStatus};
use crate::series::MetricSeries;
use crate::stats::{self, LinearFit, EPSILON};

/// Tunable thresholds for model selection and status classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSelectionConfig {
    /// Minimum points before anything other than a line is considered
    pub polynomial_min_points: usize,

    /// Polynomial fits are only tried below this many points
    pub polynomial_max_points: usize,

    /// Required relative drop in residual error for the parabola (0.10 = 10%)
    pub polynomial_min_improvement: f64,

    /// Minimum points for the autoregressive fallback
    pub ar_min_points: usize,

    /// Linear residual SD over series SD at or above which the trend counts as weak
    pub ar_min_residual_ratio: f64,

    /// Minimum lag-1 autocorrelation of the detrended series
    pub ar_min_autocorrelation: f64,

    /// Cap on the magnitude of the AR coefficient
    pub ar_max_coefficient: f64,

    /// Status tolerance as a fraction of the average
    pub status_tolerance_fraction: f64,

    /// Absolute floor of the status tolerance
    pub status_min_tolerance: f64,
}

impl Default for ModelSelectionConfig {
    fn default() -> Self {
        ModelSelectionConfig {
            polynomial_min_points: 10,
            polynomial_max_points: 30,
            polynomial_min_improvement: 0.10,
            ar_min_points: 10,
            ar_min_residual_ratio: 0.8,
            ar_min_autocorrelation: 0.3,
            ar_max_coefficient: 0.95,
            status_tolerance_fraction: 0.05,
            status_min_tolerance: 0.1,
        }
    }
}

impl ModelSelectionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.polynomial_min_points < 3 {
            return Err(HealthTrendError::invalid_argument(
                "polynomial_min_points must be at least 3",
            ));
        }
        if self.ar_min_points < 4 {
            return Err(HealthTrendError::invalid_argument(
                "ar_min_points must be at least 4",
            ));
        }
        if !(0.0..1.0).contains(&self.polynomial_min_improvement) {
            return Err(HealthTrendError::invalid_argument(
                "polynomial_min_improvement must be in [0, 1)",
            ));
        }
        if !(self.ar_max_coefficient > 0.0 && self.ar_max_coefficient < 1.0) {
            return Err(HealthTrendError::invalid_argument(
                "ar_max_coefficient must be in (0, 1)",
            ));
        }
        if self.status_tolerance_fraction < 0.0 || self.status_min_tolerance < 0.0 {
            return Err(HealthTrendError::invalid_argument(
                "status tolerances must be non-negative",
            ));
        }
        Ok(())
    }
}

/// Family of the fitted predictive model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelType {
    Linear,
    Polynomial,
    Autoregressive,
}

impl std::fmt::Display for ModelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelType::Linear => write!(f, "linear"),
            ModelType::Polynomial => write!(f, "polynomial"),
            ModelType::Autoregressive => write!(f, "autoregressive"),
        }
    }
}

/// Parameters the forecaster needs to extrapolate a model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ModelParameters {
    /// Fewer than two points: hold the single observed level
    Constant { level: f64 },

    Linear { slope: f64, intercept: f64 },

    /// `c0 + c1 * u + c2 * u^2` with `u = x - x_center`
    #[serde(rename_all = "camelCase")]
    Polynomial { coefficients: [f64; 3], x_center: f64 },

    /// AR(1) residual process around a drifting trend line
    #[serde(rename_all = "camelCase")]
    Autoregressive {
        phi: f64,
        trend_slope: f64,
        trend_intercept: f64,
        /// Detrended value of the last observation, the recurrence seed
        last_residual: f64,
    },
}

/// Fit quantities used for prediction intervals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FitDiagnostics {
    pub x_mean: f64,
    /// Sum of squared day-offset deviations
    pub sxx: f64,
    /// Degrees of freedom behind `standard_error`
    pub residual_df: usize,
    pub r_squared: Option<f64>,
    pub lag1_autocorrelation: Option<f64>,
}

/// Fitted trend of one metric
///
/// `slope` and `intercept` always describe the least-squares line, whatever
/// model type drives forecasting. `standard_error` is the residual standard
/// deviation of the selected model and is absent when there are too few
/// points to estimate it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendModel {
    pub metric: Metric,
    pub model_type: ModelType,
    pub slope: f64,
    pub intercept: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub standard_error: Option<f64>,
    /// Points behind `average`, `variance` and `current`
    pub sample_size: usize,
    /// Points the model was fitted on
    pub fitted_size: usize,
    pub average: f64,
    /// Population variance
    pub variance: f64,
    /// Last observed value
    pub current: f64,
    pub projected_7_days: f64,
    pub status_from_average: TrendStatus,
    pub predicted_status: TrendStatus,
    /// Day offset of the last fitted point
    pub last_x: i64,
    pub parameters: ModelParameters,
    pub diagnostics: FitDiagnostics,
}

impl TrendModel {
    /// Fewer than two points: zero slope, no error estimate, stable status
    pub fn is_degenerate(&self) -> bool {
        self.fitted_size < 2
    }
}

struct Selection {
    model_type: ModelType,
    parameters: ModelParameters,
    standard_error: Option<f64>,
    residual_df: usize,
}

/// Fits [`TrendModel`]s from metric series
#[derive(Debug, Clone)]
pub struct TrendModelFitter {
    config: ModelSelectionConfig,
    forecaster: Forecaster,
}

impl TrendModelFitter {
    pub fn new() -> Self {
        Self::with_config(ModelSelectionConfig::default(), ForecastConfig::default())
    }

    pub fn with_config(config: ModelSelectionConfig, forecast: ForecastConfig) -> Self {
        TrendModelFitter {
            config,
            forecaster: Forecaster::with_config(forecast),
        }
    }

    pub fn forecaster(&self) -> &Forecaster {
        &self.forecaster
    }

    /// Fit a model; `None` only for an empty series
    pub fn fit(&self, series: &MetricSeries) -> Option<TrendModel> {
        let last = series.last()?;
        let xs = series.day_offsets();
        let ys = series.values();
        let metric = series.metric;

        let average = stats::mean(&ys)?;
        let variance = stats::population_variance(&ys)?;
        let current = last.value;

        let Some(linear) = stats::linear_fit(&xs, &ys) else {
            return Some(self.degenerate(metric, &ys, last.day_offset));
        };

        let lag1 = stats::lag1_autocorrelation(&linear.residuals(&xs, &ys));
        let selection = self.select_model(&xs, &ys, &linear, variance, lag1);

        debug!(
            metric = metric.key(),
            n = ys.len(),
            model = %selection.model_type,
            "Selected trend model"
        );

        let mut model = TrendModel {
            metric,
            model_type: selection.model_type,
            slope: linear.slope,
            intercept: linear.intercept,
            standard_error: selection.standard_error,
            sample_size: ys.len(),
            fitted_size: ys.len(),
            average,
            variance,
            current,
            projected_7_days: current,
            status_from_average: TrendStatus::Stable,
            predicted_status: TrendStatus::Stable,
            last_x: last.day_offset,
            parameters: selection.parameters,
            diagnostics: FitDiagnostics {
                x_mean: linear.x_mean,
                sxx: linear.sxx,
                residual_df: selection.residual_df,
                r_squared: linear.r_squared,
                lag1_autocorrelation: lag1,
            },
        };

        let context = MetricContext::new(metric, &ys);
        model.projected_7_days = self.forecaster.project(&model, &context);
        model.status_from_average = self.classify(metric, current, average);
        model.predicted_status = self.classify(metric, model.projected_7_days, average);

        Some(model)
    }

    /// Replace the descriptive statistics with those of a reporting window
    ///
    /// The fitted parameters and `projected_7_days` are kept; `sample_size`,
    /// `average`, `variance`, `current` and both statuses are recomputed from
    /// `window`.
    /// An empty window leaves the model untouched.
    pub fn apply_window(&self, mut model: TrendModel, window: &MetricSeries) -> TrendModel {
        let values = window.values();
        let (Some(average), Some(variance), Some(current)) = (
            stats::mean(&values),
            stats::population_variance(&values),
            values.last().copied(),
        ) else {
            return model;
        };

        model.sample_size = values.len();
        model.average = average;
        model.variance = variance;
        model.current = current;

        if model.is_degenerate() {
            model.status_from_average = TrendStatus::Stable;
            model.predicted_status = TrendStatus::Stable;
        } else {
            model.status_from_average = self.classify(model.metric, current, average);
            model.predicted_status = self.classify(model.metric, model.projected_7_days, average);
        }

        model
    }

    /// Compare a value with the average using the metric's good direction
    pub fn classify(&self, metric: Metric, value: f64, average: f64) -> TrendStatus {
        let tolerance = (self.config.status_tolerance_fraction * average.abs())
            .max(self.config.status_min_tolerance);
        let difference = value - average;

        if difference.abs() <= tolerance {
            return TrendStatus::Stable;
        }

        match (metric.polarity(), difference > 0.0) {
            (Polarity::HigherIsBetter, true) | (Polarity::LowerIsBetter, false) => {
                TrendStatus::Improving
            }
            (Polarity::HigherIsBetter, false) | (Polarity::LowerIsBetter, true) => {
                TrendStatus::Worsening
            }
            (Polarity::Neutral, _) => TrendStatus::Stable,
        }
    }

    fn degenerate(&self, metric: Metric, values: &[f64], last_x: i64) -> TrendModel {
        let level = values.last().copied().unwrap_or_default();
        let average = stats::mean(values).unwrap_or(level);

        TrendModel {
            metric,
            model_type: ModelType::Linear,
            slope: 0.0,
            intercept: level,
            standard_error: None,
            sample_size: values.len(),
            fitted_size: values.len(),
            average,
            variance: stats::population_variance(values).unwrap_or_default(),
            current: level,
            projected_7_days: metric.clamp_and_round(level),
            status_from_average: TrendStatus::Stable,
            predicted_status: TrendStatus::Stable,
            last_x,
            parameters: ModelParameters::Constant { level },
            diagnostics: FitDiagnostics {
                x_mean: last_x as f64,
                sxx: 0.0,
                residual_df: 0,
                r_squared: None,
                lag1_autocorrelation: None,
            },
        }
    }

    fn select_model(
        &self,
        xs: &[f64],
        ys: &[f64],
        linear: &LinearFit,
        variance: f64,
        lag1: Option<f64>,
    ) -> Selection {
        let n = ys.len();
        let linear_se = linear.standard_error();

        if n >= self.config.polynomial_min_points && n < self.config.polynomial_max_points {
            if let Some(quadratic) = stats::quadratic_fit(xs, ys) {
                if let (Some(lse), Some(qse)) = (linear_se, quadratic.standard_error()) {
                    if lse > EPSILON && qse < lse * (1.0 - self.config.polynomial_min_improvement) {
                        return Selection {
                            model_type: ModelType::Polynomial,
                            parameters: ModelParameters::Polynomial {
                                coefficients: quadratic.coefficients,
                                x_center: quadratic.x_center,
                            },
                            standard_error: Some(qse),
                            residual_df: n - 3,
                        };
                    }
                }
            }
        }

        if n >= self.config.ar_min_points {
            if let Some(selection) = self.try_autoregressive(xs, ys, linear, variance, lag1) {
                return selection;
            }
        }

        Selection {
            model_type: ModelType::Linear,
            parameters: ModelParameters::Linear {
                slope: linear.slope,
                intercept: linear.intercept,
            },
            standard_error: linear_se,
            residual_df: n.saturating_sub(2),
        }
    }

    fn try_autoregressive(
        &self,
        xs: &[f64],
        ys: &[f64],
        linear: &LinearFit,
        variance: f64,
        lag1: Option<f64>,
    ) -> Option<Selection> {
        let sd = variance.sqrt();
        let linear_se = linear.standard_error()?;
        let phi = lag1?;

        if sd <= EPSILON
            || linear_se / sd < self.config.ar_min_residual_ratio
            || phi < self.config.ar_min_autocorrelation
        {
            return None;
        }

        let phi = phi.min(self.config.ar_max_coefficient);
        let residuals = linear.residuals(xs, ys);
        let innovation_sse: f64 = residuals
            .windows(2)
            .map(|w| (w[1] - phi * w[0]).powi(2))
            .sum();
        // intercept, slope and phi are estimated from the data
        let residual_df = ys.len().checked_sub(3).filter(|df| *df > 0)?;

        Some(Selection {
            model_type: ModelType::Autoregressive,
            parameters: ModelParameters::Autoregressive {
                phi,
                trend_slope: linear.slope,
                trend_intercept: linear.intercept,
                last_residual: *residuals.last()?,
            },
            standard_error: Some((innovation_sse / residual_df as f64).sqrt()),
            residual_df,
        })
    }
}

impl Default for TrendModelFitter {
    fn default() -> Self {
        Self::new()
    }
}
