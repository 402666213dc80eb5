//! Component-conditional summaries of the posterior chains.
//!
//! A loading classified "present" is summarized over its slab draws only,
//! and an "absent" loading over its spike draws, so that effect-size
//! estimates are not contaminated by draws from the other mixture
//! component. Marginal entries are summarized over the full retained
//! sub-chain. Factor scores and residual variances are not
//! mixture-indexed and get plain summaries.

use crate::chain::RetainedDraws;
use crate::classify::{Classification, LoadingCall};
use crate::errors::BsfaResult;
use crate::summary::{ChainSummarizer, ParamSummary};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Summary of one loading entry restricted to the draws consistent with
/// its assigned mixture component.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EntrySummary {
    /// The entry's classification.
    pub call: LoadingCall,
    /// Number of retained draws matching the assigned component.
    pub n_selected: usize,
    /// `None` when no retained draws matched the assigned component.
    pub summary: Option<ParamSummary>,
}

/// Conditional summaries for every loading entry.
#[derive(Debug, Clone)]
pub struct LoadingSummary {
    /// Entries, shape (n, K).
    pub entries: Array2<EntrySummary>,
}

impl LoadingSummary {
    /// Indices of entries whose selected sub-chain was empty.
    pub fn insufficient_entries(&self) -> Vec<(usize, usize)> {
        self.entries
            .indexed_iter()
            .filter(|(_, entry)| entry.summary.is_none())
            .map(|(idx, _)| idx)
            .collect()
    }
}

/// Build the conditional loading summary table.
pub fn summarize_loadings<S: ChainSummarizer>(
    draws: &RetainedDraws<'_>,
    classification: &Classification,
    summarizer: &S,
) -> BsfaResult<LoadingSummary> {
    let (n, k) = (draws.n_vars(), draws.n_factors());
    let placeholder = EntrySummary {
        call: LoadingCall::Marginal,
        n_selected: 0,
        summary: None,
    };
    let mut entries = Array2::from_elem((n, k), placeholder);

    for i in 0..n {
        for kk in 0..k {
            let alpha = draws.loading_entry(i, kk);
            let indicators = draws.indicator_entry(i, kk);
            let call = classification.calls[[i, kk]];

            let selected: Vec<f64> = match call {
                LoadingCall::Present => select_component(&alpha, &indicators, 1),
                LoadingCall::Absent => select_component(&alpha, &indicators, 0),
                LoadingCall::Marginal => alpha,
            };

            let summary = if selected.is_empty() {
                None
            } else {
                Some(summarizer.summarize(&selected)?)
            };
            entries[[i, kk]] = EntrySummary {
                call,
                n_selected: selected.len(),
                summary,
            };
        }
    }

    Ok(LoadingSummary { entries })
}

fn select_component(alpha: &[f64], indicators: &[u8], component: u8) -> Vec<f64> {
    alpha
        .iter()
        .zip(indicators)
        .filter(|(_, &z)| z == component)
        .map(|(&a, _)| a)
        .collect()
}

/// Summaries of the factor-score chains, shape (K, p).
pub fn summarize_scores<S: ChainSummarizer>(
    draws: &RetainedDraws<'_>,
    summarizer: &S,
) -> BsfaResult<Array2<ParamSummary>> {
    let (k, p) = (draws.n_factors(), draws.n_samples());
    let placeholder = ParamSummary {
        mean: 0.0,
        se: 0.0,
        lower: 0.0,
        upper: 0.0,
    };
    let mut table = Array2::from_elem((k, p), placeholder);
    for kk in 0..k {
        for j in 0..p {
            table[[kk, j]] = summarizer.summarize(&draws.score_entry(kk, j))?;
        }
    }
    Ok(table)
}

/// Summaries of the residual-variance chains, length n.
pub fn summarize_resid_vars<S: ChainSummarizer>(
    draws: &RetainedDraws<'_>,
    summarizer: &S,
) -> BsfaResult<Array1<ParamSummary>> {
    let n = draws.n_vars();
    let placeholder = ParamSummary {
        mean: 0.0,
        se: 0.0,
        lower: 0.0,
        upper: 0.0,
    };
    let mut table = Array1::from_elem(n, placeholder);
    for i in 0..n {
        table[i] = summarizer.summarize(&draws.resid_var_entry(i))?;
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn selection_matches_indicator_draws() {
        let alpha = vec![1.0, 5.0, 2.0, 6.0, 3.0];
        let z = vec![1u8, 0, 1, 0, 1];

        let slab = select_component(&alpha, &z, 1);
        assert_eq!(slab, vec![1.0, 2.0, 3.0]);

        let spike = select_component(&alpha, &z, 0);
        assert_eq!(spike, vec![5.0, 6.0]);
    }

    #[test]
    fn selected_mean_is_the_mean_of_matching_draws() {
        use crate::summary::{ChainSummarizer, HpdSummarizer};

        let alpha = vec![2.0, 100.0, 4.0, 100.0];
        let z = vec![1u8, 0, 1, 0];
        let selected = select_component(&alpha, &z, 1);

        let summarizer = HpdSummarizer::new(0.9).unwrap();
        let summary = summarizer.summarize(&selected).unwrap();
        assert_eq!(selected.len(), 2);
        assert_abs_diff_eq!(summary.mean, 3.0);
    }

    #[test]
    fn summary_table_respects_component_membership() {
        use crate::chain::ChainStore;
        use crate::config::SamplerControls;
        use crate::summary::HpdSummarizer;

        let controls = SamplerControls {
            sample: 6,
            burnin: 0,
            lag: 1,
            seed: 0,
        };
        let mut store = ChainStore::new(1, 2, 1, &controls);
        for t in 0..6 {
            let in_slab = t % 2 == 0;
            let alpha = if in_slab { 5.0 + (t / 2) as f64 } else { 0.0 };
            store.record(
                &Array2::from_elem((1, 1), alpha),
                &Array2::zeros((1, 2)),
                &Array1::ones(1),
                &Array2::from_elem((1, 1), in_slab as u8),
                &Array2::from_elem((1, 1), 0.5),
            );
        }
        let retained = store.retained().unwrap();
        let summarizer = HpdSummarizer::new(0.9).unwrap();
        let evidence = Array2::from_elem(
            (1, 1),
            ParamSummary {
                mean: 0.5,
                se: 0.0,
                lower: 0.4,
                upper: 0.6,
            },
        );

        // Present: only the slab draws 5, 6, 7 are summarized.
        let classification = Classification {
            calls: Array2::from_elem((1, 1), LoadingCall::Present),
            evidence: evidence.clone(),
        };
        let table = summarize_loadings(&retained, &classification, &summarizer).unwrap();
        let entry = table.entries[[0, 0]];
        assert_eq!(entry.n_selected, 3);
        assert_abs_diff_eq!(entry.summary.unwrap().mean, 6.0);

        // Absent: only the spike draws are summarized.
        let classification = Classification {
            calls: Array2::from_elem((1, 1), LoadingCall::Absent),
            evidence,
        };
        let table = summarize_loadings(&retained, &classification, &summarizer).unwrap();
        let entry = table.entries[[0, 0]];
        assert_eq!(entry.n_selected, 3);
        assert_abs_diff_eq!(entry.summary.unwrap().mean, 0.0);
    }

    #[test]
    fn empty_selection_yields_no_summary() {
        // All draws sit in the spike, but the entry is called present.
        let alpha = vec![0.0, 0.0, 0.0];
        let z = vec![0u8, 0, 0];
        let selected = select_component(&alpha, &z, 1);
        assert!(selected.is_empty());
    }
}
