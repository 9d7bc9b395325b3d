//! # Sample Equivalence Testing
//!
//! Decides whether one latency sample is stochastically lesser than,
//! greater than, or indistinguishable from another, using two one-sided
//! Mann–Whitney U tests against a shifted alternative.
//!
//! ## Statistic
//!
//! `U(x, y)` counts pairs with `x_i > y_j`, ties counting one half. It is kept
//! internally in half-units (an integer) so that `U(x, y) + U(y, x) = n·m`
//! holds exactly, which makes [`EquivalenceTester::perform`] anti-symmetric.
//!
//! ## p-values
//!
//! - **Exact**: when the pooled sample has no ties and `n + m` is at most
//!   [`EXACT_LIMIT`], the null distribution of U is enumerated by dynamic
//!   programming.
//! - **Normal approximation**: otherwise, with tie correction of the
//!   variance and a continuity correction of one half.

use crate::metrics::Sample;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

/// Largest pooled sample size for which the exact distribution is used.
pub const EXACT_LIMIT: usize = 40;

#[derive(Debug, Error, PartialEq)]
pub enum EquivalenceError {
    #[error("significance level must be in (0, 1), got {0}")]
    InvalidSignificance(f64),

    #[error("threshold must be finite and non-negative, got {0}")]
    InvalidThreshold(f64),
}

/// Outcome of comparing sample `x` against sample `y`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComparisonResult {
    Lesser,
    Indistinguishable,
    Greater,
}

impl ComparisonResult {
    /// The result of the same comparison with arguments swapped.
    pub fn reverse(self) -> Self {
        match self {
            ComparisonResult::Lesser => ComparisonResult::Greater,
            ComparisonResult::Indistinguishable => ComparisonResult::Indistinguishable,
            ComparisonResult::Greater => ComparisonResult::Lesser,
        }
    }

    pub fn to_ordering(self) -> Ordering {
        match self {
            ComparisonResult::Lesser => Ordering::Less,
            ComparisonResult::Indistinguishable => Ordering::Equal,
            ComparisonResult::Greater => Ordering::Greater,
        }
    }
}

impl fmt::Display for ComparisonResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComparisonResult::Lesser => write!(f, "Lesser"),
            ComparisonResult::Indistinguishable => write!(f, "Indistinguishable"),
            ComparisonResult::Greater => write!(f, "Greater"),
        }
    }
}

/// Minimum practically relevant difference between two samples
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Threshold {
    /// Shift by a fixed number of milliseconds
    Absolute(f64),
    /// Shift by a fraction of each value (0.02 is two percent)
    Relative(f64),
}

impl Threshold {
    pub const ZERO: Threshold = Threshold::Absolute(0.0);

    pub fn absolute(ms: f64) -> Result<Self, EquivalenceError> {
        Self::check(ms).map(Threshold::Absolute)
    }

    pub fn relative(fraction: f64) -> Result<Self, EquivalenceError> {
        Self::check(fraction).map(Threshold::Relative)
    }

    /// Threshold expressed in percent, e.g. `percent(2.0)` for two percent.
    pub fn percent(percent: f64) -> Result<Self, EquivalenceError> {
        Self::relative(percent / 100.0)
    }

    fn check(value: f64) -> Result<f64, EquivalenceError> {
        if value.is_finite() && value >= 0.0 {
            Ok(value)
        } else {
            Err(EquivalenceError::InvalidThreshold(value))
        }
    }

    /// Shift a single value up by this threshold.
    pub fn apply(&self, value: f64) -> f64 {
        match *self {
            Threshold::Absolute(delta) => value + delta,
            Threshold::Relative(fraction) => value * (1.0 + fraction),
        }
    }

    fn shift(&self, values: &[f64]) -> Vec<f64> {
        values.iter().map(|&v| self.apply(v)).collect()
    }
}

/// Validated significance level alpha, strictly between 0 and 1
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct SignificanceLevel(f64);

impl SignificanceLevel {
    pub const P05: SignificanceLevel = SignificanceLevel(0.05);
    pub const P1E3: SignificanceLevel = SignificanceLevel(1e-3);
    pub const P1E4: SignificanceLevel = SignificanceLevel(1e-4);
    pub const P1E5: SignificanceLevel = SignificanceLevel(1e-5);

    pub fn new(alpha: f64) -> Result<Self, EquivalenceError> {
        if alpha > 0.0 && alpha < 1.0 {
            Ok(Self(alpha))
        } else {
            Err(EquivalenceError::InvalidSignificance(alpha))
        }
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl TryFrom<f64> for SignificanceLevel {
    type Error = EquivalenceError;

    fn try_from(alpha: f64) -> Result<Self, Self::Error> {
        Self::new(alpha)
    }
}

impl From<SignificanceLevel> for f64 {
    fn from(level: SignificanceLevel) -> Self {
        level.0
    }
}

/// Direction of the one-sided alternative hypothesis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alternative {
    /// `x` tends to be smaller than `y`
    Less,
    /// `x` tends to be larger than `y`
    Greater,
}

/// One-sided Mann–Whitney U test
pub struct MannWhitneyTest;

impl MannWhitneyTest {
    /// U statistic of `x` against `y` (pairs with `x > y`, ties count 1/2).
    pub fn u_statistic(x: &[f64], y: &[f64]) -> f64 {
        doubled_u(x, y) as f64 / 2.0
    }

    /// p-value of the one-sided test. Returns 1.0 when either side is empty.
    pub fn p_value(x: &[f64], y: &[f64], alternative: Alternative) -> f64 {
        let n = x.len();
        let m = y.len();
        if n == 0 || m == 0 {
            return 1.0;
        }

        let u2 = doubled_u(x, y);
        let tie_sum = pooled_tie_sum(x, y);

        if tie_sum == 0 && n + m <= EXACT_LIMIT {
            // No ties means no half-pairs, so u2 is even.
            exact_p_value(n, m, u2 / 2, alternative)
        } else {
            normal_p_value(n, m, u2, tie_sum, alternative)
        }
    }
}

/// `2·#(x > y) + #(x == y)` over all pairs.
fn doubled_u(x: &[f64], y: &[f64]) -> u64 {
    let mut total = 0u64;
    for &a in x {
        for &b in y {
            total += match a.partial_cmp(&b) {
                Some(Ordering::Greater) => 2,
                Some(Ordering::Equal) => 1,
                _ => 0,
            };
        }
    }
    total
}

/// `Σ (t³ − t)` over groups of tied values in the pooled sample.
fn pooled_tie_sum(x: &[f64], y: &[f64]) -> u64 {
    let mut pooled: Vec<f64> = x.iter().chain(y.iter()).copied().collect();
    pooled.sort_by(f64::total_cmp);

    let mut sum = 0u64;
    let mut i = 0;
    while i < pooled.len() {
        let mut j = i + 1;
        while j < pooled.len() && pooled[j] == pooled[i] {
            j += 1;
        }
        let t = (j - i) as u64;
        sum += t * t * t - t;
        i = j;
    }
    sum
}

/// Frequencies of each U value (0..=n·m) over all arrangements of `n` x's
/// and `m` y's.
///
/// Counts stay below 2^53 for `n + m ≤ 40`, so they are exact in `f64`.
fn exact_distribution(n: usize, m: usize) -> Vec<f64> {
    // table[i][j] holds the distribution for sizes (i, j).
    let mut table: Vec<Vec<Vec<f64>>> = vec![vec![Vec::new(); m + 1]; n + 1];
    for i in 0..=n {
        for j in 0..=m {
            let freq = if i == 0 || j == 0 {
                vec![1.0]
            } else {
                // The largest pooled value is either an x (beating all j y's) or a y.
                let mut freq = vec![0.0; i * j + 1];
                for (u, count) in table[i - 1][j].iter().enumerate() {
                    freq[u + j] += count;
                }
                for (u, count) in table[i][j - 1].iter().enumerate() {
                    freq[u] += count;
                }
                freq
            };
            table[i][j] = freq;
        }
    }
    std::mem::take(&mut table[n][m])
}

fn exact_p_value(n: usize, m: usize, u: u64, alternative: Alternative) -> f64 {
    let freq = exact_distribution(n, m);
    let total: f64 = freq.iter().sum();
    let u = u as usize;
    let tail: f64 = match alternative {
        Alternative::Greater => freq[u..].iter().sum(),
        Alternative::Less => freq[..=u].iter().sum(),
    };
    (tail / total).min(1.0)
}

fn normal_p_value(n: usize, m: usize, u2: u64, tie_sum: u64, alternative: Alternative) -> f64 {
    let nf = n as f64;
    let mf = m as f64;
    let pooled = nf + mf;
    let u = u2 as f64 / 2.0;
    let mean = nf * mf / 2.0;
    let variance = nf * mf / 12.0 * ((pooled + 1.0) - tie_sum as f64 / (pooled * (pooled - 1.0)));

    if variance <= 0.0 {
        // Every pooled value is identical.
        return 1.0;
    }
    let sd = variance.sqrt();

    match alternative {
        Alternative::Greater => normal_cdf((mean + 0.5 - u) / sd),
        Alternative::Less => normal_cdf((u - mean + 0.5) / sd),
    }
}

/// Standard normal CDF (Abramowitz and Stegun 7.1.26).
fn normal_cdf(x: f64) -> f64 {
    let a1 = 0.254_829_592;
    let a2 = -0.284_496_736;
    let a3 = 1.421_413_741;
    let a4 = -1.453_152_027;
    let a5 = 1.061_405_429;
    let p = 0.327_591;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs() / std::f64::consts::SQRT_2;

    let t = 1.0 / (1.0 + p * x);
    let y = 1.0 - (((((a5 * t + a4) * t) + a3) * t + a2) * t + a1) * t * (-x * x).exp();

    0.5 * (1.0 + sign * y)
}

/// Two one-sided tests with a practical-relevance threshold
pub struct EquivalenceTester;

impl EquivalenceTester {
    /// Compare `x` against `y`.
    ///
    /// - `Greater` when `x` is significantly greater than `y` shifted up by
    ///   `threshold`.
    /// - `Lesser` when `x` shifted up by `threshold` is significantly less
    ///   than `y`.
    /// - `Indistinguishable` otherwise, including when either sample is
    ///   empty or both one-sided tests reject.
    pub fn perform(
        x: &[f64],
        y: &[f64],
        threshold: Threshold,
        significance: SignificanceLevel,
    ) -> ComparisonResult {
        if x.is_empty() || y.is_empty() {
            return ComparisonResult::Indistinguishable;
        }
        let alpha = significance.value();

        let shifted_y = threshold.shift(y);
        let greater = MannWhitneyTest::p_value(x, &shifted_y, Alternative::Greater) < alpha;

        let shifted_x = threshold.shift(x);
        let lesser = MannWhitneyTest::p_value(&shifted_x, y, Alternative::Less) < alpha;

        match (lesser, greater) {
            (true, false) => ComparisonResult::Lesser,
            (false, true) => ComparisonResult::Greater,
            _ => ComparisonResult::Indistinguishable,
        }
    }
}

/// Pairwise "statistically indistinguishable" predicate over samples.
///
/// Not transitive: `a ≈ b` and `b ≈ c` do not imply `a ≈ c`. Only use it for
/// local decisions between neighbours.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleEquivalence {
    pub threshold: Threshold,
    pub significance: SignificanceLevel,
}

impl SampleEquivalence {
    pub fn new(threshold: Threshold, significance: SignificanceLevel) -> Self {
        Self {
            threshold,
            significance,
        }
    }

    /// Two missing samples are equivalent; a missing and a present one are not.
    pub fn equivalent(&self, x: Option<&Sample>, y: Option<&Sample>) -> bool {
        match (x, y) {
            (None, None) => true,
            (Some(x), Some(y)) => {
                EquivalenceTester::perform(x.values(), y.values(), self.threshold, self.significance)
                    == ComparisonResult::Indistinguishable
            }
            _ => false,
        }
    }
}

impl Default for SampleEquivalence {
    /// Two percent relative threshold at the 1e-3 level.
    fn default() -> Self {
        Self::new(Threshold::Relative(0.02), SignificanceLevel::P1E3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const X: [f64; 7] = [95.0, 94.0, 101.0, 89.0, 91.0, 87.0, 96.0];
    const Y: [f64; 7] = [100.0, 96.0, 104.0, 105.0, 97.0, 94.0, 106.0];

    #[test]
    fn test_u_statistic_with_ties() {
        assert_eq!(MannWhitneyTest::u_statistic(&X, &Y), 7.0);
        assert_eq!(MannWhitneyTest::u_statistic(&Y, &X), 42.0);
    }

    #[test]
    fn test_reference_pair_at_strict_level_is_indistinguishable() {
        let level = SignificanceLevel::new(1e-4).unwrap();
        assert_eq!(
            EquivalenceTester::perform(&X, &Y, Threshold::ZERO, level),
            ComparisonResult::Indistinguishable
        );
    }

    #[test]
    fn test_reference_pair_at_five_percent_is_lesser() {
        assert_eq!(
            EquivalenceTester::perform(&X, &Y, Threshold::ZERO, SignificanceLevel::P05),
            ComparisonResult::Lesser
        );
        assert_eq!(
            EquivalenceTester::perform(&Y, &X, Threshold::ZERO, SignificanceLevel::P05),
            ComparisonResult::Greater
        );
    }

    #[test]
    fn test_normal_approximation_p_value() {
        let p = MannWhitneyTest::p_value(&X, &Y, Alternative::Less);
        assert!((p - 0.01474).abs() < 1e-4, "p = {}", p);
    }

    #[test]
    fn test_exact_p_value_for_complete_separation() {
        let low = [1.0, 2.0, 3.0];
        let high = [4.0, 5.0, 6.0];
        // One arrangement out of C(6, 3) = 20.
        let p = MannWhitneyTest::p_value(&low, &high, Alternative::Less);
        assert!((p - 0.05).abs() < 1e-12);
        let p = MannWhitneyTest::p_value(&high, &low, Alternative::Greater);
        assert!((p - 0.05).abs() < 1e-12);
        let p = MannWhitneyTest::p_value(&low, &high, Alternative::Greater);
        assert!((p - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_exact_distribution_is_symmetric_and_complete() {
        let freq = exact_distribution(4, 6);
        assert_eq!(freq.len(), 25);
        assert_eq!(freq.iter().sum::<f64>(), 210.0);
        for u in 0..freq.len() {
            assert_eq!(freq[u], freq[freq.len() - 1 - u]);
        }
    }

    #[test]
    fn test_identical_values_are_indistinguishable() {
        let same = [5.0; 6];
        assert_eq!(
            EquivalenceTester::perform(&same, &same, Threshold::ZERO, SignificanceLevel::P05),
            ComparisonResult::Indistinguishable
        );
    }

    #[test]
    fn test_empty_samples_are_indistinguishable() {
        assert_eq!(
            EquivalenceTester::perform(&[], &Y, Threshold::ZERO, SignificanceLevel::P05),
            ComparisonResult::Indistinguishable
        );
        assert_eq!(
            EquivalenceTester::perform(&X, &[], Threshold::ZERO, SignificanceLevel::P05),
            ComparisonResult::Indistinguishable
        );
    }

    #[test]
    fn test_perform_is_anti_symmetric() {
        let samples: Vec<Vec<f64>> = vec![
            X.to_vec(),
            Y.to_vec(),
            vec![70.0, 66.0, 74.0, 75.0, 67.0, 64.0, 76.0],
            vec![100.5, 104.5, 96.5, 97.5, 105.5, 106.5, 94.5],
            vec![50.0, 50.0, 51.0, 49.0],
            vec![200.0, 210.0, 190.0, 205.0, 199.0, 201.0, 220.0, 180.0],
            (0..45).map(|i| 100.0 + (i % 7) as f64).collect(),
            (0..45).map(|i| 103.0 + (i % 5) as f64).collect(),
        ];
        let thresholds = [Threshold::ZERO, Threshold::Relative(0.02), Threshold::Absolute(1.0)];
        let levels = [SignificanceLevel::P05, SignificanceLevel::P1E3];

        for a in &samples {
            for b in &samples {
                for &threshold in &thresholds {
                    for &level in &levels {
                        let ab = EquivalenceTester::perform(a, b, threshold, level);
                        let ba = EquivalenceTester::perform(b, a, threshold, level);
                        assert_eq!(ab, ba.reverse(), "a = {:?}, b = {:?}", a, b);
                    }
                }
            }
        }
    }

    #[test]
    fn test_default_equivalence_accepts_close_sample() {
        let baseline = Sample::new(Y.to_vec()).unwrap();
        let close = Sample::new(vec![100.5, 104.5, 96.5, 97.5, 105.5, 106.5, 94.5]).unwrap();
        let equivalence = SampleEquivalence::default();
        assert!(equivalence.equivalent(Some(&close), Some(&baseline)));
        assert!(equivalence.equivalent(Some(&baseline), Some(&close)));
    }

    #[test]
    fn test_default_equivalence_rejects_faster_sample() {
        let baseline = Sample::new(Y.to_vec()).unwrap();
        let faster = Sample::new(vec![70.0, 66.0, 74.0, 75.0, 67.0, 64.0, 76.0]).unwrap();
        let equivalence = SampleEquivalence::default();
        assert!(!equivalence.equivalent(Some(&faster), Some(&baseline)));
        assert!(!equivalence.equivalent(Some(&baseline), Some(&faster)));
    }

    #[test]
    fn test_missing_samples() {
        let equivalence = SampleEquivalence::default();
        let sample = Sample::new(vec![1.0]).unwrap();
        assert!(equivalence.equivalent(None, None));
        assert!(!equivalence.equivalent(Some(&sample), None));
        assert!(!equivalence.equivalent(None, Some(&sample)));
    }

    #[test]
    fn test_significance_level_validation() {
        assert!(SignificanceLevel::new(0.05).is_ok());
        assert_eq!(
            SignificanceLevel::new(0.0),
            Err(EquivalenceError::InvalidSignificance(0.0))
        );
        assert!(SignificanceLevel::new(1.0).is_err());
        assert!(SignificanceLevel::new(f64::NAN).is_err());
    }

    #[test]
    fn test_threshold_apply() {
        assert_eq!(Threshold::ZERO.apply(10.0), 10.0);
        assert_eq!(Threshold::absolute(2.5).unwrap().apply(10.0), 12.5);
        assert!((Threshold::percent(2.0).unwrap().apply(100.0) - 102.0).abs() < 1e-9);
        assert!(Threshold::relative(-0.1).is_err());
    }
}
