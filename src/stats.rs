//! Small-sample statistics shared by the trend, forecast and correlation code
//!
//! All routines work on `f64` slices and return `None` instead of NaN when
//! the input cannot support the statistic.

use statrs::distribution::{ContinuousCDF, StudentsT};
use statrs::statistics::Statistics;

use crate::error::{HealthTrendError, Result};

/// Values below this are treated as zero spread
pub const EPSILON: f64 = 1e-12;

/// Arithmetic mean
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.mean())
    }
}

/// Population variance (divides by n)
pub fn population_variance(values: &[f64]) -> Option<f64> {
    match values.len() {
        0 => None,
        1 => Some(0.0),
        _ => Some(values.population_variance().max(0.0)),
    }
}

/// Ordinary least-squares line `y = intercept + slope * x`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    /// Number of points fitted
    pub n: usize,
    /// Mean of the x values
    pub x_mean: f64,
    /// Sum of squared x deviations
    pub sxx: f64,
    /// Sum of squared residuals
    pub sse: f64,
    /// Coefficient of determination, `None` when y has no spread
    pub r_squared: Option<f64>,
}

impl LinearFit {
    pub fn predict(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }

    /// Residual standard deviation with n - 2 degrees of freedom
    pub fn standard_error(&self) -> Option<f64> {
        residual_standard_error(self.sse, self.n, 2)
    }

    pub fn residuals(&self, xs: &[f64], ys: &[f64]) -> Vec<f64> {
        xs.iter().zip(ys).map(|(x, y)| y - self.predict(*x)).collect()
    }
}

/// Fit an OLS line; needs at least two points with distinct x
pub fn linear_fit(xs: &[f64], ys: &[f64]) -> Option<LinearFit> {
    let n = xs.len();
    if n < 2 || n != ys.len() {
        return None;
    }

    let x_mean = xs.iter().sum::<f64>() / n as f64;
    let y_mean = ys.iter().sum::<f64>() / n as f64;

    let mut sxx = 0.0;
    let mut sxy = 0.0;
    let mut syy = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - x_mean;
        let dy = y - y_mean;
        sxx += dx * dx;
        sxy += dx * dy;
        syy += dy * dy;
    }

    if sxx < EPSILON {
        return None;
    }

    let slope = sxy / sxx;
    let intercept = y_mean - slope * x_mean;
    let sse = xs
        .iter()
        .zip(ys)
        .map(|(x, y)| (y - (intercept + slope * x)).powi(2))
        .sum::<f64>();
    let r_squared = if syy > EPSILON {
        Some((1.0 - sse / syy).clamp(0.0, 1.0))
    } else {
        None
    };

    Some(LinearFit {
        slope,
        intercept,
        n,
        x_mean,
        sxx,
        sse,
        r_squared,
    })
}

/// Least-squares parabola in centred x:
/// `y = c0 + c1 * (x - x_center) + c2 * (x - x_center)^2`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadraticFit {
    pub coefficients: [f64; 3],
    pub x_center: f64,
    pub n: usize,
    pub sse: f64,
}

impl QuadraticFit {
    pub fn predict(&self, x: f64) -> f64 {
        let u = x - self.x_center;
        let [c0, c1, c2] = self.coefficients;
        c0 + c1 * u + c2 * u * u
    }

    /// Residual standard deviation with n - 3 degrees of freedom
    pub fn standard_error(&self) -> Option<f64> {
        residual_standard_error(self.sse, self.n, 3)
    }
}

/// Fit a degree-2 polynomial; needs at least three distinct x values
pub fn quadratic_fit(xs: &[f64], ys: &[f64]) -> Option<QuadraticFit> {
    let n = xs.len();
    if n < 3 || n != ys.len() {
        return None;
    }

    let x_center = xs.iter().sum::<f64>() / n as f64;

    // Normal equations over powers of the centred x
    let mut s = [0.0f64; 5];
    let mut t = [0.0f64; 3];
    for (x, y) in xs.iter().zip(ys) {
        let u = x - x_center;
        let mut p = 1.0;
        for (k, sk) in s.iter_mut().enumerate() {
            *sk += p;
            if k < 3 {
                t[k] += p * y;
            }
            p *= u;
        }
    }

    let matrix = [
        [s[0], s[1], s[2]],
        [s[1], s[2], s[3]],
        [s[2], s[3], s[4]],
    ];
    let coefficients = solve_3x3(matrix, t)?;

    let fit = QuadraticFit {
        coefficients,
        x_center,
        n,
        sse: 0.0,
    };
    let sse = xs
        .iter()
        .zip(ys)
        .map(|(x, y)| (y - fit.predict(*x)).powi(2))
        .sum::<f64>();

    Some(QuadraticFit { sse, ..fit })
}

/// Gaussian elimination with partial pivoting
fn solve_3x3(mut a: [[f64; 3]; 3], mut b: [f64; 3]) -> Option<[f64; 3]> {
    for col in 0..3 {
        let pivot = (col..3).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot][col].abs() < 1e-10 {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in (col + 1)..3 {
            let factor = a[row][col] / a[col][col];
            for k in col..3 {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = [0.0f64; 3];
    for row in (0..3).rev() {
        let tail: f64 = ((row + 1)..3).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }

    if x.iter().all(|v| v.is_finite()) {
        Some(x)
    } else {
        None
    }
}

/// `sqrt(sse / (n - params))`, `None` when no degrees of freedom remain
pub fn residual_standard_error(sse: f64, n: usize, params: usize) -> Option<f64> {
    if n <= params {
        return None;
    }
    Some((sse.max(0.0) / (n - params) as f64).sqrt())
}

/// Lag-1 autocorrelation (Yule-Walker estimate) of a zero-mean series
pub fn lag1_autocorrelation(residuals: &[f64]) -> Option<f64> {
    if residuals.len() < 3 {
        return None;
    }

    let denominator: f64 = residuals.iter().map(|e| e * e).sum();
    if denominator < EPSILON {
        return None;
    }

    let numerator: f64 = residuals.windows(2).map(|w| w[0] * w[1]).sum();
    Some((numerator / denominator).clamp(-1.0, 1.0))
}

/// Pearson correlation coefficient, clamped to [-1, 1]
///
/// Returns `None` for fewer than two pairs or when either side is constant.
pub fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    let n = xs.len();
    if n < 2 || n != ys.len() {
        return None;
    }

    let x_mean = xs.iter().sum::<f64>() / n as f64;
    let y_mean = ys.iter().sum::<f64>() / n as f64;

    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - x_mean;
        let dy = y - y_mean;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }

    if sxx < EPSILON || syy < EPSILON {
        return None;
    }

    Some((sxy / (sxx.sqrt() * syy.sqrt())).clamp(-1.0, 1.0))
}

/// Two-sided Student-t critical value for a confidence level
pub fn t_critical(confidence_level: f64, degrees_of_freedom: usize) -> Result<f64> {
    if !(confidence_level > 0.0 && confidence_level < 1.0) {
        return Err(HealthTrendError::invalid_argument(format!(
            "confidence level must be in (0, 1), got {}",
            confidence_level
        )));
    }
    if degrees_of_freedom == 0 {
        return Err(HealthTrendError::invalid_argument(
            "t critical value needs at least one degree of freedom",
        ));
    }

    let distribution = StudentsT::new(0.0, 1.0, degrees_of_freedom as f64)
        .map_err(|e| HealthTrendError::Internal(e.to_string()))?;
    Ok(distribution.inverse_cdf(0.5 + confidence_level / 2.0))
}
