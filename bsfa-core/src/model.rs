//! Model entry point and result bundle.
//!
//! `fit` wires the pipeline together: sampler -> chain store ->
//! {classifier, summary builders} -> [`FitResult`]. The classifier runs
//! first because the conditional loading summary depends on it; the
//! score and residual-variance summaries only read finished chains and
//! run concurrently.

use crate::chain::ChainStore;
use crate::classify::{classify_inclusion, Classification};
use crate::conditional::{
    summarize_loadings, summarize_resid_vars, summarize_scores, LoadingSummary,
};
use crate::config::ModelConfig;
use crate::errors::BsfaResult;
use crate::sampler::{GibbsSampler, ProgressInfo};
use crate::summary::{effective_sample_size, HpdSummarizer, ParamSummary};
use log::info;
use ndarray::{Array1, Array2, Array3};

/// Convergence-related diagnostics computed from the retained chains.
#[derive(Debug, Clone, Copy)]
pub struct FitDiagnostics {
    /// Smallest effective sample size across the residual-variance chains.
    pub min_resid_var_ess: f64,

    /// Number of loading entries whose selected sub-chain was empty.
    pub insufficient_entries: usize,
}

/// Everything produced by a model fit.
///
/// The chain arrays hold only the retained (post-burn-in, thinned) draws;
/// the first axis of each indexes draws.
#[derive(Debug, Clone)]
pub struct FitResult {
    /// The data matrix the model was fitted to.
    pub data: Array2<f64>,

    /// Configuration used for the fit.
    pub config: ModelConfig,

    /// Per-entry classification with its interval evidence.
    pub classification: Classification,

    /// Component-conditional loading summaries, shape (n, K).
    pub loading_summary: LoadingSummary,

    /// Factor-score summaries, shape (K, p).
    pub score_summary: Array2<ParamSummary>,

    /// Residual-variance summaries, length n.
    pub resid_var_summary: Array1<ParamSummary>,

    /// Retained running-inclusion draws, shape (draws, n, K).
    pub inclusion_chain: Array3<f64>,

    /// Retained loading draws, shape (draws, n, K).
    pub loading_chain: Array3<f64>,

    /// Retained factor-score draws, shape (draws, K, p).
    pub score_chain: Array3<f64>,

    /// Retained residual-variance draws, shape (draws, n).
    pub resid_var_chain: Array2<f64>,

    /// Retained indicator draws, shape (draws, n, K).
    pub indicator_chain: Array3<u8>,

    /// Chain diagnostics.
    pub diagnostics: FitDiagnostics,
}

/// Fit the sparse factor model to `x` (variables x samples).
pub fn fit(x: Array2<f64>, config: ModelConfig) -> BsfaResult<FitResult> {
    let sampler = GibbsSampler::new(x, config)?;
    let chains = sampler.run()?;
    build_result(sampler, chains)
}

/// Fit with a per-iteration progress callback.
pub fn fit_with_progress<F>(x: Array2<f64>, config: ModelConfig, callback: F) -> BsfaResult<FitResult>
where
    F: FnMut(&ProgressInfo),
{
    let sampler = GibbsSampler::new(x, config)?;
    let chains = sampler.run_with_progress(callback)?;
    build_result(sampler, chains)
}

fn build_result(sampler: GibbsSampler, chains: ChainStore) -> BsfaResult<FitResult> {
    let config = sampler.config().clone();
    let summarizer = HpdSummarizer::new(config.credible_mass)?;
    let retained = chains.retained()?;

    let classification = classify_inclusion(&retained, &summarizer)?;
    let (loading_summary, (score_summary, resid_var_summary)) = rayon::join(
        || summarize_loadings(&retained, &classification, &summarizer),
        || {
            rayon::join(
                || summarize_scores(&retained, &summarizer),
                || summarize_resid_vars(&retained, &summarizer),
            )
        },
    );
    let loading_summary = loading_summary?;
    let score_summary = score_summary?;
    let resid_var_summary = resid_var_summary?;

    let min_resid_var_ess = (0..retained.n_vars())
        .map(|i| effective_sample_size(&retained.resid_var_entry(i)))
        .fold(f64::INFINITY, f64::min);

    let insufficient_entries = loading_summary.insufficient_entries().len();
    if insufficient_entries > 0 {
        info!(
            "{} loading entries had no retained draws in their assigned component",
            insufficient_entries
        );
    }

    Ok(FitResult {
        classification,
        loading_summary,
        score_summary,
        resid_var_summary,
        inclusion_chain: retained.inclusion(),
        loading_chain: retained.loadings(),
        score_chain: retained.scores(),
        resid_var_chain: retained.resid_vars(),
        indicator_chain: retained.indicators(),
        diagnostics: FitDiagnostics {
            min_resid_var_ess,
            insufficient_entries,
        },
        config,
        data: sampler.into_data(),
    })
}
