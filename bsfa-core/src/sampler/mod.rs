//! Gibbs sampler for the sparse latent factor model.
//!
//! The model for an n x p data matrix X with K latent factors is
//!
//! $$ X_{ij} = \sum_k \alpha_{ik} \lambda_{kj} + \epsilon_{ij}, \qquad
//!    \epsilon_{ij} \sim N(0, \sigma^2_i) $$
//!
//! with a spike-and-slab prior on each loading alpha\[i,k\] governed by a
//! Bernoulli indicator z\[i,k\], Beta-distributed per-factor inclusion
//! probabilities q\[k\], standard-normal factor scores and InverseGamma
//! residual variances.
//!
//! One sweep draws, in order: factor scores, the joint indicator/loading
//! pairs, inclusion probabilities, residual variances, and finally updates
//! the running inclusion estimates. Within a sweep the per-sample score
//! draws and the per-variable loading/variance draws are conditionally
//! independent and run on the rayon pool; every parallel unit derives its
//! own RNG stream from the master seed, so chains are bit-identical for a
//! fixed seed regardless of thread count.
//!
//! Identifiability: the top K x K block of the loading matrix is kept
//! lower-triangular with a strictly positive diagonal. Entries above the
//! diagonal are structural zeros (never sampled, indicator fixed at 0),
//! diagonal entries always draw from the slab (indicator fixed at 1), and
//! a deterministic sign flip of the (loading column, score row) pair
//! restores a positive diagonal after each loading sweep.

mod spike;

use crate::chain::ChainStore;
use crate::config::ModelConfig;
use crate::errors::{BsfaError, BsfaResult};
use log::{debug, info};
use nalgebra::{Cholesky, DMatrix, DVector};
use ndarray::parallel::prelude::*;
use ndarray::{Array1, Array2, Axis, Zip};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Beta, Distribution, Gamma, StandardNormal};

/// Lower clamp applied to residual-variance draws.
const RESID_VAR_FLOOR: f64 = 1e-12;

/// Progress snapshot passed to callbacks once per iteration.
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// Current iteration (1-indexed).
    pub iteration: usize,

    /// Total number of iterations.
    pub total: usize,

    /// Fraction of indicators currently in the slab component.
    pub slab_fraction: f64,

    /// Mean residual variance across variables.
    pub mean_resid_var: f64,
}

/// Mutable state of one Gibbs sweep. Owned by the engine; the chain store
/// snapshots it once per iteration.
struct SweepState {
    /// Loadings, shape (n, K).
    loadings: Array2<f64>,
    /// Factor scores, shape (K, p).
    scores: Array2<f64>,
    /// Residual variances, length n.
    resid_vars: Array1<f64>,
    /// Inclusion indicators, shape (n, K).
    indicators: Array2<u8>,
    /// Per-factor inclusion probabilities, length K.
    inclusion_probs: Array1<f64>,
    /// Cumulative indicator sums, shape (n, K). Kept as integers so the
    /// running mean equals the arithmetic mean of the indicator history
    /// exactly.
    inclusion_counts: Array2<u64>,
    /// Running inclusion means, shape (n, K).
    inclusion_means: Array2<f64>,
}

impl SweepState {
    fn init(n: usize, p: usize, k: usize, config: &ModelConfig) -> Self {
        // Deterministic start; the first sweep replaces every block with a
        // posterior draw.
        let priors = &config.priors;
        let prior_mean = priors.inclusion_alpha / (priors.inclusion_alpha + priors.inclusion_beta);

        let mut indicators = Array2::zeros((n, k));
        for kk in 0..k {
            indicators[[kk, kk]] = 1;
        }

        Self {
            loadings: Array2::zeros((n, k)),
            scores: Array2::zeros((k, p)),
            resid_vars: Array1::ones(n),
            indicators,
            inclusion_probs: Array1::from_elem(k, prior_mean),
            inclusion_counts: Array2::zeros((n, k)),
            inclusion_means: Array2::zeros((n, k)),
        }
    }

    fn slab_fraction(&self) -> f64 {
        let ones: usize = self.indicators.iter().map(|&z| z as usize).sum();
        ones as f64 / self.indicators.len() as f64
    }

    /// Fold this iteration's indicators into the running means.
    fn update_inclusion_means(&mut self, t: usize) {
        Zip::from(&mut self.inclusion_counts)
            .and(&self.indicators)
            .for_each(|c, &z| *c += z as u64);

        let t_f = t as f64;
        Zip::from(&mut self.inclusion_means)
            .and(&self.inclusion_counts)
            .for_each(|m, &c| *m = c as f64 / t_f);
    }
}

/// Gibbs sampler engine for a fixed data matrix and configuration.
pub struct GibbsSampler {
    x: Array2<f64>,
    config: ModelConfig,
}

impl GibbsSampler {
    /// Create a sampler for the given data matrix (variables x samples).
    ///
    /// The configuration and the shape compatibility of the data with the
    /// requested factor count are checked before any sampling happens.
    pub fn new(x: Array2<f64>, config: ModelConfig) -> BsfaResult<Self> {
        config.validate()?;

        let (n, p) = x.dim();
        let k = config.n_factors;
        let shape_err = |reason: &str| BsfaError::Shape {
            n_vars: n,
            n_samples: p,
            n_factors: k,
            reason: reason.to_string(),
        };

        if n == 0 || p == 0 {
            return Err(shape_err("data matrix is empty"));
        }
        if k > n || k > p {
            return Err(shape_err("factor count exceeds a data dimension"));
        }
        if x.iter().any(|v| !v.is_finite()) {
            return Err(shape_err("data matrix contains non-finite values"));
        }

        Ok(Self { x, config })
    }

    /// The data matrix the sampler was built for.
    pub fn data(&self) -> &Array2<f64> {
        &self.x
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Consume the sampler, returning the data matrix.
    pub fn into_data(self) -> Array2<f64> {
        self.x
    }

    /// Run the full chain.
    pub fn run(&self) -> BsfaResult<ChainStore> {
        self.run_inner(None::<fn(&ProgressInfo)>)
    }

    /// Run the full chain, invoking `callback` once per iteration.
    pub fn run_with_progress<F>(&self, callback: F) -> BsfaResult<ChainStore>
    where
        F: FnMut(&ProgressInfo),
    {
        self.run_inner(Some(callback))
    }

    fn run_inner<F>(&self, mut callback: Option<F>) -> BsfaResult<ChainStore>
    where
        F: FnMut(&ProgressInfo),
    {
        let (n, p) = self.x.dim();
        let k = self.config.n_factors;
        let controls = &self.config.controls;
        let total = controls.iterations();

        info!(
            "sampling {} iterations ({} burn-in) for {} variables x {} samples, {} factors, {} spike",
            total,
            controls.burnin,
            n,
            p,
            k,
            self.config.priors.spike.name()
        );

        let mut rng = ChaCha8Rng::seed_from_u64(controls.seed);
        let mut state = SweepState::init(n, p, k, &self.config);
        let mut chains = ChainStore::new(n, p, k, controls);

        for t in 1..=total {
            self.update_scores(&mut state, &mut rng, t)?;
            self.update_loadings(&mut state, &mut rng, t)?;
            self.update_inclusion_probs(&mut state, &mut rng, t)?;
            self.update_resid_vars(&mut state, &mut rng, t)?;
            state.update_inclusion_means(t);

            chains.record(
                &state.loadings,
                &state.scores,
                &state.resid_vars,
                &state.indicators,
                &state.inclusion_means,
            );

            if t % 250 == 0 {
                debug!(
                    "iteration {}/{}: slab fraction {:.3}",
                    t,
                    total,
                    state.slab_fraction()
                );
            }
            if let Some(cb) = callback.as_mut() {
                cb(&ProgressInfo {
                    iteration: t,
                    total,
                    slab_fraction: state.slab_fraction(),
                    mean_resid_var: state.resid_vars.mean().unwrap_or(f64::NAN),
                });
            }
        }

        info!("sampling finished: {} retained draws", controls.sample);
        Ok(chains)
    }

    /// Draw the factor scores column-by-column from their normal
    /// conditional.
    ///
    /// The posterior precision `P = I + A^T D^{-1} A` is shared by every
    /// sample column, so it is assembled and factorized once per sweep.
    /// Each column then solves `P m = A^T D^{-1} x_j` and draws
    /// `lambda_j = m + L^{-T} z` with z standard normal.
    fn update_scores(
        &self,
        state: &mut SweepState,
        rng: &mut ChaCha8Rng,
        t: usize,
    ) -> BsfaResult<()> {
        let (n, p) = self.x.dim();
        let k = self.config.n_factors;

        let mut prec = DMatrix::<f64>::identity(k, k);
        for i in 0..n {
            let w = 1.0 / state.resid_vars[i];
            for a in 0..k {
                let la = state.loadings[[i, a]];
                if la == 0.0 {
                    continue;
                }
                for b in a..k {
                    let v = la * state.loadings[[i, b]] * w;
                    prec[(a, b)] += v;
                    if a != b {
                        prec[(b, a)] += v;
                    }
                }
            }
        }

        let chol = Cholesky::new(prec).ok_or_else(|| BsfaError::NumericalInstability {
            iteration: t,
            quantity: "factor score precision",
            detail: "posterior precision matrix is not positive definite".to_string(),
        })?;
        let upper = chol.l().transpose();

        // Right-hand sides B = A^T D^{-1} X for every column at once.
        let mut weighted_loadings = state.loadings.clone();
        for (mut row, &s2) in weighted_loadings
            .outer_iter_mut()
            .zip(state.resid_vars.iter())
        {
            row.map_inplace(|v| *v /= s2);
        }
        let rhs = weighted_loadings.t().dot(&self.x);

        let seeds: Vec<u64> = (0..p).map(|_| rng.gen()).collect();

        state
            .scores
            .axis_iter_mut(Axis(1))
            .into_par_iter()
            .enumerate()
            .for_each(|(j, mut col)| {
                let mut rng_j = ChaCha8Rng::seed_from_u64(seeds[j]);
                let b_j = DVector::from_fn(k, |r, _| rhs[[r, j]]);
                let mean = chol.solve(&b_j);
                let noise = DVector::<f64>::from_fn(k, |_, _| rng_j.sample(StandardNormal));
                match upper.solve_upper_triangular(&noise) {
                    Some(dev) => {
                        for r in 0..k {
                            col[r] = mean[r] + dev[r];
                        }
                    }
                    None => col.fill(f64::NAN),
                }
            });

        if state.scores.iter().any(|v| !v.is_finite()) {
            return Err(BsfaError::NumericalInstability {
                iteration: t,
                quantity: "factor scores",
                detail: "conditional draw produced non-finite values".to_string(),
            });
        }
        Ok(())
    }

    /// Jointly draw the indicator and loading for every free entry, then
    /// restore the reference orientation.
    ///
    /// For each entry the slab and spike marginal likelihoods of the
    /// variable's residual are combined with the current prior odds
    /// q\[k\] / (1 - q\[k\]), the indicator is drawn from the resulting
    /// Bernoulli posterior, and the loading from the conditional of the
    /// drawn component.
    fn update_loadings(
        &self,
        state: &mut SweepState,
        rng: &mut ChaCha8Rng,
        t: usize,
    ) -> BsfaResult<()> {
        let n = self.x.nrows();
        let k = self.config.n_factors;
        let omega1 = self.config.priors.slab_variance;
        let spike_prior = self.config.priors.spike;

        // sum_j lambda_kj^2 is shared across variables.
        let lam_ss: Vec<f64> = (0..k)
            .map(|kk| state.scores.row(kk).dot(&state.scores.row(kk)))
            .collect();

        let seeds: Vec<u64> = (0..n).map(|_| rng.gen()).collect();
        let scores = &state.scores;
        let q = &state.inclusion_probs;

        Zip::indexed(state.loadings.outer_iter_mut())
            .and(state.indicators.outer_iter_mut())
            .and(self.x.outer_iter())
            .and(&state.resid_vars)
            .par_for_each(|i, mut alpha_row, mut z_row, x_row, &s2| {
                let mut rng_i = ChaCha8Rng::seed_from_u64(seeds[i]);
                let w = 1.0 / s2;
                let p = x_row.len();

                // Residual after subtracting this row's current fit.
                let mut resid: Vec<f64> = (0..p)
                    .map(|j| {
                        let mut fitted = 0.0;
                        for kk in 0..k {
                            fitted += alpha_row[kk] * scores[[kk, j]];
                        }
                        x_row[j] - fitted
                    })
                    .collect();

                for kk in 0..k {
                    if i < kk {
                        // Structural zero above the diagonal of the
                        // reference block.
                        continue;
                    }

                    let a_old = alpha_row[kk];
                    let lam = scores.row(kk);
                    let mut s_lr = 0.0;
                    for j in 0..p {
                        s_lr += lam[j] * (resid[j] + a_old * lam[j]);
                    }

                    let v1 = 1.0 / (1.0 / omega1 + lam_ss[kk] * w);
                    let m1 = v1 * s_lr * w;

                    let (z_new, a_new) = if i == kk {
                        // Reference diagonal stays in the slab.
                        (1u8, spike::draw_normal(&mut rng_i, m1, v1))
                    } else {
                        let log_slab = spike::log_normal_marginal(omega1, s_lr, lam_ss[kk], w);
                        let log_spike = spike::log_marginal(&spike_prior, s_lr, lam_ss[kk], w);
                        let log_odds =
                            q[kk].ln() - (1.0 - q[kk]).ln() + log_slab - log_spike;
                        let p_slab = 1.0 / (1.0 + (-log_odds).exp());

                        if rng_i.gen::<f64>() < p_slab {
                            (1, spike::draw_normal(&mut rng_i, m1, v1))
                        } else {
                            (0, spike::draw(&spike_prior, &mut rng_i, s_lr, lam_ss[kk], w))
                        }
                    };

                    if a_new != a_old {
                        for j in 0..p {
                            resid[j] += (a_old - a_new) * lam[j];
                        }
                    }
                    alpha_row[kk] = a_new;
                    z_row[kk] = z_new;
                }
            });

        if state.loadings.iter().any(|v| !v.is_finite()) {
            return Err(BsfaError::NumericalInstability {
                iteration: t,
                quantity: "loadings",
                detail: "conditional draw produced non-finite values".to_string(),
            });
        }

        // Deterministic sign fix: flipping a (loading column, score row)
        // pair leaves the likelihood unchanged and keeps the reference
        // diagonal strictly positive.
        for kk in 0..k {
            if state.loadings[[kk, kk]] < 0.0 {
                state.loadings.column_mut(kk).map_inplace(|v| *v = -*v);
                state.scores.row_mut(kk).map_inplace(|v| *v = -*v);
            }
        }
        Ok(())
    }

    /// Draw the per-factor inclusion probabilities from their Beta
    /// posterior with parameters (gamma_a + sum z, gamma_b + sum (1 - z)).
    fn update_inclusion_probs(
        &self,
        state: &mut SweepState,
        rng: &mut ChaCha8Rng,
        t: usize,
    ) -> BsfaResult<()> {
        let n = state.indicators.nrows() as u64;
        let priors = &self.config.priors;

        for kk in 0..state.inclusion_probs.len() {
            let ones: u64 = state
                .indicators
                .column(kk)
                .iter()
                .map(|&z| z as u64)
                .sum();
            let a = priors.inclusion_alpha + ones as f64;
            let b = priors.inclusion_beta + (n - ones) as f64;
            let dist = Beta::new(a, b).map_err(|e| BsfaError::NumericalInstability {
                iteration: t,
                quantity: "inclusion probability",
                detail: e.to_string(),
            })?;
            state.inclusion_probs[kk] = dist.sample(rng);
        }
        Ok(())
    }

    /// Draw the residual variances from their InverseGamma conditional
    /// with shape a + p/2 and scale b + SSE/2.
    fn update_resid_vars(
        &self,
        state: &mut SweepState,
        rng: &mut ChaCha8Rng,
        t: usize,
    ) -> BsfaResult<()> {
        let n = self.x.nrows();
        let k = self.config.n_factors;
        let shape = self.config.priors.variance_shape + self.x.ncols() as f64 / 2.0;
        let prior_scale = self.config.priors.variance_scale;

        let seeds: Vec<u64> = (0..n).map(|_| rng.gen()).collect();
        let scores = &state.scores;

        Zip::indexed(&mut state.resid_vars)
            .and(state.loadings.outer_iter())
            .and(self.x.outer_iter())
            .par_for_each(|i, s2, alpha_row, x_row| {
                let mut rng_i = ChaCha8Rng::seed_from_u64(seeds[i]);

                let mut sse = 0.0;
                for j in 0..x_row.len() {
                    let mut fitted = 0.0;
                    for kk in 0..k {
                        fitted += alpha_row[kk] * scores[[kk, j]];
                    }
                    let r = x_row[j] - fitted;
                    sse += r * r;
                }

                let scale = prior_scale + 0.5 * sse;
                *s2 = if !scale.is_finite() || scale <= 0.0 {
                    f64::NAN
                } else {
                    match Gamma::new(shape, 1.0 / scale) {
                        Ok(dist) => {
                            let g: f64 = dist.sample(&mut rng_i);
                            if g > 0.0 {
                                (1.0 / g).max(RESID_VAR_FLOOR)
                            } else {
                                f64::NAN
                            }
                        }
                        Err(_) => f64::NAN,
                    }
                };
            });

        if state.resid_vars.iter().any(|v| !v.is_finite()) {
            return Err(BsfaError::NumericalInstability {
                iteration: t,
                quantity: "residual variances",
                detail: "conditional draw produced non-finite values".to_string(),
            });
        }
        Ok(())
    }
}
