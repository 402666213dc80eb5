//! Pre-allocated storage for the raw Gibbs chains.
//!
//! Every tracked quantity gets a fixed-size array with exactly
//! `sample + burnin` rows, allocated before sampling starts. The store is
//! written once per iteration by the sampler engine and is read-only
//! downstream; partial iterations are never exposed. Burn-in discard and
//! thinning happen in [`RetainedDraws`], never in the store itself.

use crate::config::SamplerControls;
use crate::errors::{BsfaError, BsfaResult};
use ndarray::{s, Array1, Array2, Array3};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Raw per-iteration chains for every tracked quantity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainStore {
    n_vars: usize,
    n_samples: usize,
    n_factors: usize,
    sample: usize,
    burnin: usize,
    lag: usize,
    recorded: usize,

    /// Loadings, shape (ite, n, K).
    loadings: Array3<f64>,
    /// Factor scores, shape (ite, K, p).
    scores: Array3<f64>,
    /// Residual variances, shape (ite, n).
    resid_vars: Array2<f64>,
    /// Inclusion indicators, shape (ite, n, K).
    indicators: Array3<u8>,
    /// Running inclusion estimates, shape (ite, n, K).
    inclusion: Array3<f64>,
}

impl ChainStore {
    pub(crate) fn new(
        n_vars: usize,
        n_samples: usize,
        n_factors: usize,
        controls: &SamplerControls,
    ) -> Self {
        let ite = controls.iterations();
        Self {
            n_vars,
            n_samples,
            n_factors,
            sample: controls.sample,
            burnin: controls.burnin,
            lag: controls.lag,
            recorded: 0,
            loadings: Array3::zeros((ite, n_vars, n_factors)),
            scores: Array3::zeros((ite, n_factors, n_samples)),
            resid_vars: Array2::zeros((ite, n_vars)),
            indicators: Array3::zeros((ite, n_vars, n_factors)),
            inclusion: Array3::zeros((ite, n_vars, n_factors)),
        }
    }

    /// Total number of iterations the store was allocated for.
    pub fn iterations(&self) -> usize {
        self.sample + self.burnin
    }

    /// Number of iterations recorded so far.
    pub fn recorded(&self) -> usize {
        self.recorded
    }

    /// Whether every allocated row has been written.
    pub fn is_complete(&self) -> bool {
        self.recorded == self.iterations()
    }

    pub fn n_vars(&self) -> usize {
        self.n_vars
    }

    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    pub fn n_factors(&self) -> usize {
        self.n_factors
    }

    /// Full loading chain, shape (ite, n, K).
    pub fn raw_loadings(&self) -> &Array3<f64> {
        &self.loadings
    }

    /// Full factor-score chain, shape (ite, K, p).
    pub fn raw_scores(&self) -> &Array3<f64> {
        &self.scores
    }

    /// Full residual-variance chain, shape (ite, n).
    pub fn raw_resid_vars(&self) -> &Array2<f64> {
        &self.resid_vars
    }

    /// Full indicator chain, shape (ite, n, K).
    pub fn raw_indicators(&self) -> &Array3<u8> {
        &self.indicators
    }

    /// Full running-inclusion chain, shape (ite, n, K).
    pub fn raw_inclusion(&self) -> &Array3<f64> {
        &self.inclusion
    }

    /// Record one iteration's state into the next free row.
    pub(crate) fn record(
        &mut self,
        loadings: &Array2<f64>,
        scores: &Array2<f64>,
        resid_vars: &Array1<f64>,
        indicators: &Array2<u8>,
        inclusion: &Array2<f64>,
    ) {
        debug_assert!(self.recorded < self.iterations(), "chain store is full");
        let t = self.recorded;
        self.loadings.slice_mut(s![t, .., ..]).assign(loadings);
        self.scores.slice_mut(s![t, .., ..]).assign(scores);
        self.resid_vars.slice_mut(s![t, ..]).assign(resid_vars);
        self.indicators.slice_mut(s![t, .., ..]).assign(indicators);
        self.inclusion.slice_mut(s![t, .., ..]).assign(inclusion);
        self.recorded += 1;
    }

    /// View of the burned-in, thinned draws. Fails if the chain has not
    /// completed all of its iterations.
    pub fn retained(&self) -> BsfaResult<RetainedDraws<'_>> {
        if !self.is_complete() {
            return Err(BsfaError::InvalidParameter(format!(
                "chain is incomplete: {} of {} iterations recorded",
                self.recorded,
                self.iterations()
            )));
        }
        Ok(RetainedDraws { store: self })
    }

    /// Save the chain store to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> BsfaResult<()> {
        let file = File::create(path)
            .map_err(|e| BsfaError::ChainIo(format!("failed to create chain file: {}", e)))?;
        let mut writer = BufWriter::new(file);

        bincode::serialize_into(&mut writer, self)
            .map_err(|e| BsfaError::ChainIo(format!("failed to serialize chain: {}", e)))?;

        writer
            .flush()
            .map_err(|e| BsfaError::ChainIo(format!("failed to flush chain file: {}", e)))?;

        Ok(())
    }

    /// Load a chain store from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> BsfaResult<Self> {
        let file = File::open(path)
            .map_err(|e| BsfaError::ChainIo(format!("failed to open chain file: {}", e)))?;
        let mut reader = BufReader::new(file);

        let store: ChainStore = bincode::deserialize_from(&mut reader)
            .map_err(|e| BsfaError::ChainIo(format!("failed to deserialize chain: {}", e)))?;

        Ok(store)
    }
}

/// Read-only view of a completed chain applying burn-in discard and
/// thinning. Safe for concurrent readers.
#[derive(Debug, Clone, Copy)]
pub struct RetainedDraws<'a> {
    store: &'a ChainStore,
}

impl RetainedDraws<'_> {
    /// Number of retained draws.
    pub fn n_draws(&self) -> usize {
        (self.store.sample + self.store.lag - 1) / self.store.lag
    }

    pub fn n_vars(&self) -> usize {
        self.store.n_vars
    }

    pub fn n_samples(&self) -> usize {
        self.store.n_samples
    }

    pub fn n_factors(&self) -> usize {
        self.store.n_factors
    }

    fn rows(&self) -> impl Iterator<Item = usize> + '_ {
        (self.store.burnin..self.store.iterations()).step_by(self.store.lag)
    }

    /// Retained loading draws for one entry.
    pub fn loading_entry(&self, i: usize, k: usize) -> Vec<f64> {
        self.rows().map(|t| self.store.loadings[[t, i, k]]).collect()
    }

    /// Retained indicator draws for one entry.
    pub fn indicator_entry(&self, i: usize, k: usize) -> Vec<u8> {
        self.rows()
            .map(|t| self.store.indicators[[t, i, k]])
            .collect()
    }

    /// Retained running-inclusion draws for one entry.
    pub fn inclusion_entry(&self, i: usize, k: usize) -> Vec<f64> {
        self.rows()
            .map(|t| self.store.inclusion[[t, i, k]])
            .collect()
    }

    /// Retained factor-score draws for one (factor, sample) pair.
    pub fn score_entry(&self, k: usize, j: usize) -> Vec<f64> {
        self.rows().map(|t| self.store.scores[[t, k, j]]).collect()
    }

    /// Retained residual-variance draws for one variable.
    pub fn resid_var_entry(&self, i: usize) -> Vec<f64> {
        self.rows()
            .map(|t| self.store.resid_vars[[t, i]])
            .collect()
    }

    /// Retained loading draws, shape (draws, n, K).
    pub fn loadings(&self) -> Array3<f64> {
        let st = self.store;
        st.loadings.slice(s![st.burnin..; st.lag, .., ..]).to_owned()
    }

    /// Retained factor-score draws, shape (draws, K, p).
    pub fn scores(&self) -> Array3<f64> {
        let st = self.store;
        st.scores.slice(s![st.burnin..; st.lag, .., ..]).to_owned()
    }

    /// Retained residual-variance draws, shape (draws, n).
    pub fn resid_vars(&self) -> Array2<f64> {
        let st = self.store;
        st.resid_vars.slice(s![st.burnin..; st.lag, ..]).to_owned()
    }

    /// Retained indicator draws, shape (draws, n, K).
    pub fn indicators(&self) -> Array3<u8> {
        let st = self.store;
        st.indicators.slice(s![st.burnin..; st.lag, .., ..]).to_owned()
    }

    /// Retained running-inclusion draws, shape (draws, n, K).
    pub fn inclusion(&self) -> Array3<f64> {
        let st = self.store;
        st.inclusion.slice(s![st.burnin..; st.lag, .., ..]).to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, Array2};

    fn controls(sample: usize, burnin: usize, lag: usize) -> SamplerControls {
        SamplerControls {
            sample,
            burnin,
            lag,
            seed: 0,
        }
    }

    /// Fill a store with recognisable values: iteration t stores t as f64
    /// everywhere and t % 2 in the indicators.
    fn filled_store(n: usize, p: usize, k: usize, controls: &SamplerControls) -> ChainStore {
        let mut store = ChainStore::new(n, p, k, controls);
        for t in 0..controls.iterations() {
            let v = t as f64;
            store.record(
                &Array2::from_elem((n, k), v),
                &Array2::from_elem((k, p), v),
                &Array1::from_elem(n, v),
                &Array2::from_elem((n, k), (t % 2) as u8),
                &Array2::from_elem((n, k), v / controls.iterations() as f64),
            );
        }
        store
    }

    #[test]
    fn preallocates_exactly_ite_rows() {
        let store = ChainStore::new(4, 6, 2, &controls(10, 5, 1));
        assert_eq!(store.iterations(), 15);
        assert_eq!(store.raw_loadings().dim(), (15, 4, 2));
        assert_eq!(store.raw_scores().dim(), (15, 2, 6));
        assert_eq!(store.raw_resid_vars().dim(), (15, 4));
        assert_eq!(store.raw_indicators().dim(), (15, 4, 2));
        assert_eq!(store.raw_inclusion().dim(), (15, 4, 2));
        assert_eq!(store.recorded(), 0);
        assert!(!store.is_complete());
    }

    #[test]
    fn incomplete_chain_has_no_retained_view() {
        let mut store = ChainStore::new(2, 3, 1, &controls(4, 2, 1));
        store.record(
            &Array2::zeros((2, 1)),
            &Array2::zeros((1, 3)),
            &Array1::zeros(2),
            &Array2::zeros((2, 1)),
            &Array2::zeros((2, 1)),
        );
        assert!(store.retained().is_err());
    }

    #[test]
    fn retained_discards_burnin() {
        let ctl = controls(6, 4, 1);
        let store = filled_store(2, 3, 2, &ctl);
        let retained = store.retained().unwrap();

        assert_eq!(retained.n_draws(), 6);
        // The first retained draw is the first post-burn-in iteration.
        assert_eq!(retained.loading_entry(0, 0), vec![4.0, 5.0, 6.0, 7.0, 8.0, 9.0]);
        assert_eq!(retained.loadings().dim(), (6, 2, 2));
    }

    #[test]
    fn lag_thins_the_retained_range() {
        let ctl = controls(10, 5, 3);
        let store = filled_store(2, 3, 1, &ctl);
        let retained = store.retained().unwrap();

        // ceil(10 / 3) draws: iterations 5, 8, 11, 14.
        assert_eq!(retained.n_draws(), 4);
        assert_eq!(retained.resid_var_entry(0), vec![5.0, 8.0, 11.0, 14.0]);
        assert_eq!(retained.scores().dim(), (4, 1, 3));
        assert_eq!(retained.indicator_entry(1, 0), vec![1, 0, 1, 0]);
    }

    #[test]
    fn entry_accessors_match_bulk_extraction() {
        let ctl = controls(8, 3, 2);
        let store = filled_store(3, 4, 2, &ctl);
        let retained = store.retained().unwrap();

        let bulk = retained.inclusion();
        let entry = retained.inclusion_entry(2, 1);
        for (d, &v) in entry.iter().enumerate() {
            assert_eq!(bulk[[d, 2, 1]], v);
        }

        let bulk = retained.scores();
        let entry = retained.score_entry(1, 3);
        for (d, &v) in entry.iter().enumerate() {
            assert_eq!(bulk[[d, 1, 3]], v);
        }
    }

    #[test]
    fn save_load_round_trip() {
        let ctl = controls(5, 2, 1);
        let store = filled_store(2, 3, 1, &ctl);

        let path = std::env::temp_dir().join("bsfa-chain-roundtrip.bin");
        store.save(&path).unwrap();
        let loaded = ChainStore::load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded, store);
    }
}
