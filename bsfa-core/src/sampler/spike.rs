//! Spike-component strategy for the joint indicator/loading draw.
//!
//! The two sampler variants share every update rule except how the spike
//! component of a loading is evaluated and drawn; that difference lives
//! behind [`SpikePrior`]. For a zero-centred normal prior with variance
//! `omega` on a loading, the conditional posterior given the residual
//! statistics is Normal(m, v) with
//!
//! v = 1 / (1/omega + lam_ss / sigma2),  m = v * s_lr / sigma2
//!
//! where `s_lr` = sum_j lambda_kj * r_ij and `lam_ss` = sum_j lambda_kj^2.

use crate::config::SpikePrior;
use rand::Rng;
use rand_distr::{Distribution, Normal};

/// Conditional posterior mean and variance for a normal prior with
/// variance `omega`.
fn conditional(omega: f64, s_lr: f64, lam_ss: f64, w: f64) -> (f64, f64) {
    let v = 1.0 / (1.0 / omega + lam_ss * w);
    let m = v * s_lr * w;
    (m, v)
}

/// Log marginal likelihood of the residual under a normal prior with
/// variance `omega`, up to the component-independent constant.
pub(crate) fn log_normal_marginal(omega: f64, s_lr: f64, lam_ss: f64, w: f64) -> f64 {
    let (m, v) = conditional(omega, s_lr, lam_ss, w);
    0.5 * (v / omega).ln() + 0.5 * m * m / v
}

/// Log marginal likelihood contribution of the spike component. For the
/// point mass the component-independent constant cancels to zero.
pub(crate) fn log_marginal(spike: &SpikePrior, s_lr: f64, lam_ss: f64, w: f64) -> f64 {
    match spike {
        SpikePrior::PointMass => 0.0,
        SpikePrior::Gaussian { variance } => log_normal_marginal(*variance, s_lr, lam_ss, w),
    }
}

/// Draw a loading from the spike component's conditional.
pub(crate) fn draw<R: Rng>(
    spike: &SpikePrior,
    rng: &mut R,
    s_lr: f64,
    lam_ss: f64,
    w: f64,
) -> f64 {
    match spike {
        SpikePrior::PointMass => 0.0,
        SpikePrior::Gaussian { variance } => {
            let (m, v) = conditional(*variance, s_lr, lam_ss, w);
            draw_normal(rng, m, v)
        }
    }
}

/// Normal draw parameterized by mean and variance. Non-finite parameters
/// surface as NaN and are caught by the sweep's finiteness check.
pub(crate) fn draw_normal<R: Rng>(rng: &mut R, mean: f64, variance: f64) -> f64 {
    match Normal::new(mean, variance.sqrt()) {
        Ok(dist) => dist.sample(rng),
        Err(_) => f64::NAN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn point_mass_always_draws_zero() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        for _ in 0..50 {
            assert_eq!(draw(&SpikePrior::PointMass, &mut rng, 3.0, 10.0, 1.0), 0.0);
        }
    }

    #[test]
    fn tight_gaussian_spike_approximates_the_point_mass() {
        // As the spike variance shrinks, its marginal tends to the
        // point-mass constant (zero).
        let (s_lr, lam_ss, w) = (4.0, 50.0, 1.0);
        let wide = log_marginal(&SpikePrior::Gaussian { variance: 1e-2 }, s_lr, lam_ss, w);
        let tight = log_marginal(&SpikePrior::Gaussian { variance: 1e-8 }, s_lr, lam_ss, w);
        let point = log_marginal(&SpikePrior::PointMass, s_lr, lam_ss, w);

        assert_eq!(point, 0.0);
        assert!((tight - point).abs() < (wide - point).abs());
        assert_abs_diff_eq!(tight, point, epsilon = 1e-3);
    }

    #[test]
    fn gaussian_spike_draws_concentrate_near_zero() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let spike = SpikePrior::Gaussian { variance: 1e-4 };
        for _ in 0..100 {
            let v = draw(&spike, &mut rng, 0.0, 100.0, 1.0);
            assert!(v.abs() < 0.1, "spike draw {} too far from zero", v);
        }
    }

    #[test]
    fn conditional_matches_closed_form() {
        // omega = 1, lam_ss = 3, sigma2 = 1: v = 1/4, m = s_lr / 4.
        let (m, v) = conditional(1.0, 8.0, 3.0, 1.0);
        assert_abs_diff_eq!(v, 0.25);
        assert_abs_diff_eq!(m, 2.0);
    }
}
