//! Posterior classification of loadings from the inclusion-probability
//! chain.
//!
//! Each loading entry gets a three-level call derived from the HPD
//! interval of its retained running-inclusion draws: an interval entirely
//! above 0.5 means the entry sat in the slab component for most of the
//! chain, entirely below means the spike, and anything straddling 0.5 is
//! left undecided. The classification is a pure function of the retained
//! draws and the summarizer.

use crate::chain::RetainedDraws;
use crate::errors::BsfaResult;
use crate::summary::{ChainSummarizer, ParamSummary};
use indexmap::IndexMap;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Decision threshold separating the spike and slab components.
const INCLUSION_THRESHOLD: f64 = 0.5;

/// Three-level call for a single loading entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoadingCall {
    /// The credible interval lies entirely above 0.5.
    Present,
    /// The credible interval straddles 0.5.
    Marginal,
    /// The credible interval lies entirely below 0.5.
    Absent,
}

impl LoadingCall {
    /// Returns a display name for this call.
    pub fn name(&self) -> &'static str {
        match self {
            LoadingCall::Present => "present",
            LoadingCall::Marginal => "marginal",
            LoadingCall::Absent => "absent",
        }
    }
}

impl fmt::Display for LoadingCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-entry calls together with the interval evidence behind them.
#[derive(Debug, Clone)]
pub struct Classification {
    /// Calls, shape (n, K).
    pub calls: Array2<LoadingCall>,
    /// Summary of the retained running-inclusion draws per entry.
    pub evidence: Array2<ParamSummary>,
}

impl Classification {
    /// Ordered counts per call, for reporting.
    pub fn counts(&self) -> IndexMap<&'static str, usize> {
        let mut counts = IndexMap::new();
        counts.insert(LoadingCall::Present.name(), 0);
        counts.insert(LoadingCall::Marginal.name(), 0);
        counts.insert(LoadingCall::Absent.name(), 0);
        for call in self.calls.iter() {
            *counts.entry(call.name()).or_insert(0) += 1;
        }
        counts
    }
}

/// Call a single entry from the summary of its inclusion draws.
pub fn call_from_summary(summary: &ParamSummary) -> LoadingCall {
    if summary.lower > INCLUSION_THRESHOLD {
        LoadingCall::Present
    } else if summary.upper < INCLUSION_THRESHOLD {
        LoadingCall::Absent
    } else {
        LoadingCall::Marginal
    }
}

/// Classify every loading entry from the retained inclusion chain.
pub fn classify_inclusion<S: ChainSummarizer>(
    draws: &RetainedDraws<'_>,
    summarizer: &S,
) -> BsfaResult<Classification> {
    let (n, k) = (draws.n_vars(), draws.n_factors());
    let placeholder = ParamSummary {
        mean: 0.0,
        se: 0.0,
        lower: 0.0,
        upper: 0.0,
    };
    let mut calls = Array2::from_elem((n, k), LoadingCall::Marginal);
    let mut evidence = Array2::from_elem((n, k), placeholder);

    for i in 0..n {
        for kk in 0..k {
            let entry = draws.inclusion_entry(i, kk);
            let summary = summarizer.summarize(&entry)?;
            calls[[i, kk]] = call_from_summary(&summary);
            evidence[[i, kk]] = summary;
        }
    }

    Ok(Classification { calls, evidence })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(lower: f64, upper: f64) -> ParamSummary {
        ParamSummary {
            mean: 0.5 * (lower + upper),
            se: 0.0,
            lower,
            upper,
        }
    }

    #[test]
    fn interval_above_threshold_is_present() {
        assert_eq!(call_from_summary(&summary(0.6, 0.9)), LoadingCall::Present);
    }

    #[test]
    fn interval_below_threshold_is_absent() {
        assert_eq!(call_from_summary(&summary(0.05, 0.3)), LoadingCall::Absent);
    }

    #[test]
    fn straddling_interval_is_marginal() {
        assert_eq!(call_from_summary(&summary(0.3, 0.7)), LoadingCall::Marginal);
        // Touching the threshold is not decisive either way.
        assert_eq!(call_from_summary(&summary(0.5, 0.9)), LoadingCall::Marginal);
        assert_eq!(call_from_summary(&summary(0.1, 0.5)), LoadingCall::Marginal);
    }

    #[test]
    fn classifies_from_a_synthetic_inclusion_chain() {
        use crate::chain::ChainStore;
        use crate::config::SamplerControls;
        use crate::summary::HpdSummarizer;
        use ndarray::Array1;

        let controls = SamplerControls {
            sample: 40,
            burnin: 0,
            lag: 1,
            seed: 0,
        };
        let mut store = ChainStore::new(3, 2, 1, &controls);
        for t in 0..40 {
            // Entry 0 hovers high, entry 1 low, entry 2 straddles 0.5.
            let wobble = if t % 2 == 0 { 0.02 } else { -0.02 };
            let inclusion = Array2::from_shape_vec(
                (3, 1),
                vec![0.9 + wobble, 0.1 + wobble, 0.5 + wobble],
            )
            .unwrap();
            store.record(
                &Array2::zeros((3, 1)),
                &Array2::zeros((1, 2)),
                &Array1::ones(3),
                &Array2::zeros((3, 1)),
                &inclusion,
            );
        }

        let retained = store.retained().unwrap();
        let summarizer = HpdSummarizer::new(0.95).unwrap();
        let classification = classify_inclusion(&retained, &summarizer).unwrap();

        assert_eq!(classification.calls[[0, 0]], LoadingCall::Present);
        assert_eq!(classification.calls[[1, 0]], LoadingCall::Absent);
        assert_eq!(classification.calls[[2, 0]], LoadingCall::Marginal);
    }

    #[test]
    fn counts_are_ordered_and_complete() {
        let calls = Array2::from_shape_vec(
            (2, 2),
            vec![
                LoadingCall::Present,
                LoadingCall::Absent,
                LoadingCall::Absent,
                LoadingCall::Marginal,
            ],
        )
        .unwrap();
        let evidence = Array2::from_elem((2, 2), summary(0.0, 1.0));
        let classification = Classification { calls, evidence };

        let counts = classification.counts();
        let collected: Vec<_> = counts.iter().map(|(&name, &c)| (name, c)).collect();
        assert_eq!(
            collected,
            vec![("present", 1), ("marginal", 1), ("absent", 2)]
        );
    }
}
