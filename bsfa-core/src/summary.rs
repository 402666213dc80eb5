//! Posterior chain summaries and highest-posterior-density intervals.
//!
//! The classifier and the conditional summary builder depend on the
//! [`ChainSummarizer`] contract only: an ordered sequence of draws goes
//! in, a point estimate with interval bounds comes out. The default
//! implementation computes a kernel-free HPD interval by searching the
//! sorted draws for the smallest window holding the target mass.

use crate::errors::{BsfaError, BsfaResult};
use serde::{Deserialize, Serialize};

/// Point estimate and interval for a single scalar parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParamSummary {
    /// Posterior mean of the draws.
    pub mean: f64,
    /// Monte-Carlo standard error (sd / sqrt(n)).
    pub se: f64,
    /// Lower bound of the HPD interval.
    pub lower: f64,
    /// Upper bound of the HPD interval.
    pub upper: f64,
}

/// Contract for turning an ordered sequence of posterior draws into a
/// point estimate and interval bounds.
pub trait ChainSummarizer {
    fn summarize(&self, draws: &[f64]) -> BsfaResult<ParamSummary>;
}

/// Sorted-draws HPD summarizer: the interval is the smallest window of
/// consecutive order statistics containing the target probability mass.
#[derive(Debug, Clone, Copy)]
pub struct HpdSummarizer {
    mass: f64,
}

impl HpdSummarizer {
    /// Create a summarizer with the given interval coverage (e.g. 0.95).
    pub fn new(mass: f64) -> BsfaResult<Self> {
        if !(mass > 0.0 && mass < 1.0) {
            return Err(BsfaError::InvalidParameter(format!(
                "credible mass must lie strictly between 0 and 1, got {}",
                mass
            )));
        }
        Ok(Self { mass })
    }
}

impl ChainSummarizer for HpdSummarizer {
    fn summarize(&self, draws: &[f64]) -> BsfaResult<ParamSummary> {
        if draws.is_empty() {
            return Err(BsfaError::InsufficientDraws { needed: 1, got: 0 });
        }
        if draws.iter().any(|v| !v.is_finite()) {
            return Err(BsfaError::InvalidParameter(
                "draws contain non-finite values".to_string(),
            ));
        }

        let n = draws.len();
        let mean = draws.iter().sum::<f64>() / n as f64;
        let se = if n > 1 {
            let var = draws.iter().map(|&x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
            (var / n as f64).sqrt()
        } else {
            0.0
        };

        let mut sorted = draws.to_vec();
        sorted.sort_unstable_by(f64::total_cmp);
        let (lower, upper) = hpd_bounds(&sorted, self.mass);

        Ok(ParamSummary {
            mean,
            se,
            lower,
            upper,
        })
    }
}

/// Bounds of the smallest window of `sorted` containing `mass` of the
/// draws.
fn hpd_bounds(sorted: &[f64], mass: f64) -> (f64, f64) {
    let n = sorted.len();
    let m = ((mass * n as f64).ceil() as usize).clamp(1, n);

    let mut best = (sorted[0], sorted[n - 1]);
    let mut best_width = f64::INFINITY;
    for i in 0..=(n - m) {
        let width = sorted[i + m - 1] - sorted[i];
        if width < best_width {
            best_width = width;
            best = (sorted[i], sorted[i + m - 1]);
        }
    }
    best
}

/// Empirical quantile with linear interpolation between order statistics.
pub fn quantile(draws: &[f64], q: f64) -> BsfaResult<f64> {
    if draws.is_empty() {
        return Err(BsfaError::InsufficientDraws { needed: 1, got: 0 });
    }
    if !(0.0..=1.0).contains(&q) {
        return Err(BsfaError::InvalidParameter(format!(
            "quantile must lie in [0, 1], got {}",
            q
        )));
    }

    let mut sorted = draws.to_vec();
    sorted.sort_unstable_by(f64::total_cmp);

    let idx = q * (sorted.len() - 1) as f64;
    let lo = idx.floor() as usize;
    let hi = idx.ceil() as usize;
    if lo == hi {
        Ok(sorted[lo])
    } else {
        let frac = idx - lo as f64;
        Ok(sorted[lo] * (1.0 - frac) + sorted[hi] * frac)
    }
}

/// Autocorrelation of a chain at lags 1..=max_lag.
fn autocorrelation(chain: &[f64], max_lag: usize) -> Vec<f64> {
    let n = chain.len();
    let mean = chain.iter().sum::<f64>() / n as f64;
    let variance = chain.iter().map(|&x| (x - mean).powi(2)).sum::<f64>() / n as f64;

    if variance == 0.0 {
        return vec![0.0; max_lag];
    }

    let mut autocorr = Vec::with_capacity(max_lag);
    for lag in 1..=max_lag {
        if lag >= n {
            autocorr.push(0.0);
            continue;
        }

        let mut covariance = 0.0;
        for i in 0..(n - lag) {
            covariance += (chain[i] - mean) * (chain[i + lag] - mean);
        }
        covariance /= (n - lag) as f64;

        autocorr.push(covariance / variance);
    }

    autocorr
}

/// Effective sample size of a single chain.
///
/// Sums positive autocorrelations until the first non-positive lag, then
/// returns n / (1 + 2 * sum). Chains shorter than 10 draws are returned
/// at face value.
pub fn effective_sample_size(chain: &[f64]) -> f64 {
    let n = chain.len();
    if n < 10 {
        return n as f64;
    }

    let max_lag = (n / 2).min(100);
    let autocorr = autocorrelation(chain, max_lag);

    let mut sum_autocorr = 0.0;
    for &ac in &autocorr {
        if ac <= 0.0 {
            break;
        }
        sum_autocorr += ac;
    }

    n as f64 / (1.0 + 2.0 * sum_autocorr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn summary_of_known_draws() {
        let draws = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let summary = HpdSummarizer::new(0.95).unwrap().summarize(&draws).unwrap();

        assert_abs_diff_eq!(summary.mean, 3.0);
        // sd = sqrt(2.5), se = sd / sqrt(5)
        assert_abs_diff_eq!(summary.se, (2.5f64 / 5.0).sqrt(), epsilon = 1e-12);
        // 95% of 5 draws rounds up to all 5.
        assert_abs_diff_eq!(summary.lower, 1.0);
        assert_abs_diff_eq!(summary.upper, 5.0);
    }

    #[test]
    fn hpd_prefers_the_tightest_window() {
        // Half the mass clusters near zero; a 50% interval must pick the
        // cluster, not the spread-out tail.
        let draws = vec![0.0, 0.01, 0.02, 0.03, 10.0, 20.0, 30.0, 40.0];
        let summary = HpdSummarizer::new(0.5).unwrap().summarize(&draws).unwrap();

        assert_eq!(summary.lower, 0.0);
        assert_eq!(summary.upper, 0.03);
    }

    #[test]
    fn empty_draws_are_rejected() {
        let summarizer = HpdSummarizer::new(0.95).unwrap();
        assert!(matches!(
            summarizer.summarize(&[]),
            Err(BsfaError::InsufficientDraws { .. })
        ));
    }

    #[test]
    fn non_finite_draws_are_rejected() {
        let summarizer = HpdSummarizer::new(0.95).unwrap();
        assert!(summarizer.summarize(&[1.0, f64::NAN]).is_err());
    }

    #[test]
    fn invalid_mass_is_rejected() {
        assert!(HpdSummarizer::new(0.0).is_err());
        assert!(HpdSummarizer::new(1.0).is_err());
    }

    #[test]
    fn quantile_interpolates() {
        let draws = vec![4.0, 1.0, 3.0, 2.0];
        assert_abs_diff_eq!(quantile(&draws, 0.0).unwrap(), 1.0);
        assert_abs_diff_eq!(quantile(&draws, 1.0).unwrap(), 4.0);
        assert_abs_diff_eq!(quantile(&draws, 0.5).unwrap(), 2.5);
    }

    #[test]
    fn ess_of_iid_draws_is_near_n() {
        // Alternating signs have negative lag-1 autocorrelation, so the
        // positive-sum truncation stops immediately.
        let chain: Vec<f64> = (0..200).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let ess = effective_sample_size(&chain);
        assert_abs_diff_eq!(ess, 200.0, epsilon = 1e-9);
    }

    #[test]
    fn ess_of_sticky_chain_is_small() {
        // A slowly varying chain should have a much smaller ESS than n.
        let chain: Vec<f64> = (0..200).map(|i| (i / 50) as f64).collect();
        assert!(effective_sample_size(&chain) < 50.0);
    }
}
