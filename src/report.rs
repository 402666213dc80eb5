//! Human-readable rendering of a fit result. Pure presentation: no
//! statistics are computed here.

use bsfa_core::model::FitResult;

/// Render a textual summary of a fit: table dimensions, classification
/// counts and chain diagnostics.
pub fn render(result: &FitResult) -> String {
    let (n_draws, n_vars, n_factors) = result.loading_chain.dim();
    let n_samples = result.score_chain.dim().2;

    let mut out = String::new();
    out.push_str("Sparse latent factor model fit\n");
    out.push_str(&format!(
        "  data: {} variables x {} samples, {} factors ({} spike)\n",
        n_vars,
        n_samples,
        n_factors,
        result.config.priors.spike.name()
    ));
    out.push_str(&format!(
        "  retained draws: {} (burn-in {}, lag {})\n",
        n_draws, result.config.controls.burnin, result.config.controls.lag
    ));
    out.push_str(&format!(
        "  loading table: {} x {}, score table: {} x {}\n",
        n_vars, n_factors, n_factors, n_samples
    ));

    out.push_str("  classification:\n");
    for (name, count) in result.classification.counts() {
        out.push_str(&format!("    {:>8}: {}\n", name, count));
    }

    out.push_str(&format!(
        "  min residual-variance ESS: {:.1}\n",
        result.diagnostics.min_resid_var_ess
    ));
    if result.diagnostics.insufficient_entries > 0 {
        out.push_str(&format!(
            "  entries with insufficient posterior mass: {}\n",
            result.diagnostics.insufficient_entries
        ));
    }

    out
}
