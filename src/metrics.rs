//! # Latency Metrics
//!
//! Descriptive statistics over the successful request durations of a single
//! endpoint. All values are in milliseconds.
//!
//! Quartiles use linear interpolation between closest ranks (Hyndman–Fan
//! type 7, index `p·(N−1)` on the sorted sample). The same estimator is used
//! everywhere the crate needs a quantile, including the density histogram and
//! the Tukey fence heuristic in ranking.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors raised while computing metrics
#[derive(Debug, Error, PartialEq)]
pub enum MetricsError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Successful latency measurements for one endpoint, in attempt order.
///
/// A `Sample` is never empty; "no successful attempts" is represented as
/// `Option<Sample>::None` by its owners.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sample(Vec<f64>);

impl Sample {
    /// Build a sample, returning `None` when `values` is empty.
    pub fn new(values: Vec<f64>) -> Option<Self> {
        if values.is_empty() {
            None
        } else {
            Some(Self(values))
        }
    }

    pub fn values(&self) -> &[f64] {
        &self.0
    }

    pub fn count(&self) -> usize {
        self.0.len()
    }
}

/// The five quartiles Q0 (min) through Q4 (max).
///
/// Serialized as a plain five-element array.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quartiles([f64; 5]);

impl Quartiles {
    /// Compute quartiles of an already sorted, non-empty slice.
    pub(crate) fn from_sorted(sorted: &[f64]) -> Self {
        Self([
            quantile_sorted(sorted, 0.0),
            quantile_sorted(sorted, 0.25),
            quantile_sorted(sorted, 0.5),
            quantile_sorted(sorted, 0.75),
            quantile_sorted(sorted, 1.0),
        ])
    }

    pub fn as_array(&self) -> &[f64; 5] {
        &self.0
    }

    pub fn q0(&self) -> f64 {
        self.0[0]
    }

    pub fn q1(&self) -> f64 {
        self.0[1]
    }

    pub fn median(&self) -> f64 {
        self.0[2]
    }

    pub fn q3(&self) -> f64 {
        self.0[3]
    }

    pub fn q4(&self) -> f64 {
        self.0[4]
    }
}

/// Linear-interpolation quantile of a sorted, non-empty slice.
///
/// `p` is a fraction in `[0, 1]`.
pub(crate) fn quantile_sorted(sorted: &[f64], p: f64) -> f64 {
    let index = p.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower_index = index.floor() as usize;
    let upper_index = index.ceil() as usize;

    if lower_index == upper_index {
        sorted[lower_index]
    } else {
        let lower_value = sorted[lower_index];
        let upper_value = sorted[upper_index];
        let weight = index - lower_index as f64;
        lower_value + weight * (upper_value - lower_value)
    }
}

/// Descriptive statistics of a sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub count: usize,
    pub mean: f64,
    /// Bessel-corrected; zero for a single value.
    pub variance: f64,
    pub std_dev: f64,
    pub std_err: f64,
    pub quartiles: Quartiles,
    pub iqr: f64,
}

impl Metrics {
    /// Compute metrics of arbitrary values.
    ///
    /// Fails with [`MetricsError::InvalidInput`] if `values` is empty or
    /// contains a non-finite number.
    pub fn compute(values: &[f64]) -> Result<Self, MetricsError> {
        if values.is_empty() {
            return Err(MetricsError::InvalidInput(
                "cannot compute metrics of an empty sample".to_string(),
            ));
        }
        if let Some(bad) = values.iter().find(|v| !v.is_finite()) {
            return Err(MetricsError::InvalidInput(format!(
                "sample contains non-finite value {}",
                bad
            )));
        }
        Ok(Self::from_values(values))
    }

    /// Metrics of a sample. Samples are produced from measured wall-clock
    /// durations, which are always finite.
    pub fn of(sample: &Sample) -> Self {
        Self::from_values(sample.values())
    }

    fn from_values(values: &[f64]) -> Self {
        let count = values.len();
        let n = count as f64;
        let mean = values.iter().sum::<f64>() / n;

        let variance = if count == 1 {
            0.0
        } else {
            values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0)
        };
        let std_dev = variance.sqrt();
        let std_err = std_dev / n.sqrt();

        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);
        let quartiles = Quartiles::from_sorted(&sorted);

        Self {
            count,
            mean,
            variance,
            std_dev,
            std_err,
            iqr: quartiles.q3() - quartiles.q1(),
            quartiles,
        }
    }

    pub fn min(&self) -> f64 {
        self.quartiles.q0()
    }

    pub fn max(&self) -> f64 {
        self.quartiles.q4()
    }

    /// Pessimistic upper estimate used as the final ranking tie-break.
    pub fn upper_three_sigma(&self) -> f64 {
        self.mean + 3.0 * self.std_dev
    }
}

impl fmt::Display for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Mean = {}, StdDev = {}, Error = {}, Count = {}",
            format_ms(self.mean),
            format_ms(self.std_dev),
            format_ms(self.std_err),
            self.count
        )
    }
}

/// Format a millisecond value with a unit suited to its magnitude.
pub fn format_ms(ms: f64) -> String {
    if !ms.is_finite() {
        return "n/a".to_string();
    }
    if ms < 1.0 {
        format!("{:.1}μs", ms * 1_000.0)
    } else if ms < 1_000.0 {
        format!("{:.2}ms", ms)
    } else {
        format!("{:.3}s", ms / 1_000.0)
    }
}
