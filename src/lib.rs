//! Bayesian sparse latent factor analysis.
//!
//! Fits a sparse latent factor model to a numeric matrix (variables x
//! samples, e.g. genes x arrays) with a spike-and-slab prior on the
//! loadings. The deliverable is a posterior chain together with a
//! present/marginal/absent call for every loading entry and
//! component-conditional summary tables.
//!
//! The computational core lives in `bsfa-core`; this crate re-exports the
//! public API and adds textual reporting.
//!
//! # Example
//!
//! ```no_run
//! use bsfa::{fit, ModelConfig};
//! use ndarray::Array2;
//!
//! let x: Array2<f64> = Array2::zeros((20, 100));
//! let config = ModelConfig::new(2);
//! let result = fit(x, config).unwrap();
//! println!("{}", bsfa::report::render(&result));
//! ```

pub mod report;

pub use bsfa_core::chain::{ChainStore, RetainedDraws};
pub use bsfa_core::classify::{classify_inclusion, Classification, LoadingCall};
pub use bsfa_core::conditional::{
    summarize_loadings, summarize_resid_vars, summarize_scores, EntrySummary, LoadingSummary,
};
pub use bsfa_core::config::{ModelConfig, PriorConfig, SamplerControls, SpikePrior};
pub use bsfa_core::errors::{BsfaError, BsfaResult};
pub use bsfa_core::model::{fit, fit_with_progress, FitDiagnostics, FitResult};
pub use bsfa_core::sampler::{GibbsSampler, ProgressInfo};
pub use bsfa_core::summary::{
    effective_sample_size, quantile, ChainSummarizer, HpdSummarizer, ParamSummary,
};
