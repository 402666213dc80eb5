//! Model configuration: prior hyperparameters and sampler controls.
//!
//! All hyperparameters are carried in explicit immutable structs handed to
//! the sampler; there is no ambient configuration state. Each field
//! documents its default. Configurations can be read from and written to
//! TOML.

use crate::errors::{BsfaError, BsfaResult};
use serde::{Deserialize, Serialize};

/// Spike component of the spike-and-slab mixture prior on the loadings.
///
/// The two sampler variants differ only in this choice; every other
/// update rule is shared.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SpikePrior {
    /// Exact point mass at zero: an excluded loading is zero in every draw.
    PointMass,

    /// Tight zero-centred normal with the given variance. The variance
    /// must be smaller than the slab variance.
    Gaussian { variance: f64 },
}

impl SpikePrior {
    /// Returns a display name for this variant.
    pub fn name(&self) -> &'static str {
        match self {
            SpikePrior::PointMass => "point-mass",
            SpikePrior::Gaussian { .. } => "normal-normal",
        }
    }

    fn validate(&self, slab_variance: f64) -> BsfaResult<()> {
        if let SpikePrior::Gaussian { variance } = self {
            if !variance.is_finite() || *variance <= 0.0 {
                return Err(BsfaError::InvalidParameter(format!(
                    "spike variance must be positive and finite, got {}",
                    variance
                )));
            }
            if *variance >= slab_variance {
                return Err(BsfaError::InvalidParameter(format!(
                    "spike variance ({}) must be smaller than the slab variance ({})",
                    variance, slab_variance
                )));
            }
        }
        Ok(())
    }
}

/// Prior hyperparameters for the sparse factor model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorConfig {
    /// InverseGamma shape for the residual variances.
    /// default: 2.0
    pub variance_shape: f64,

    /// InverseGamma scale for the residual variances.
    /// default: 1.0
    pub variance_scale: f64,

    /// First Beta parameter of the per-factor inclusion probability.
    /// default: 1.0
    pub inclusion_alpha: f64,

    /// Second Beta parameter of the per-factor inclusion probability.
    /// default: 1.0
    pub inclusion_beta: f64,

    /// Slab variance: prior variance of a loading that carries signal.
    /// default: 10.0
    pub slab_variance: f64,

    /// Spike component used when a loading carries no signal.
    /// default: Gaussian with variance 0.01
    pub spike: SpikePrior,
}

impl Default for PriorConfig {
    fn default() -> Self {
        Self {
            variance_shape: 2.0,
            variance_scale: 1.0,
            inclusion_alpha: 1.0,
            inclusion_beta: 1.0,
            slab_variance: 10.0,
            spike: SpikePrior::Gaussian { variance: 0.01 },
        }
    }
}

impl PriorConfig {
    fn validate(&self) -> BsfaResult<()> {
        for (name, value) in [
            ("variance_shape", self.variance_shape),
            ("variance_scale", self.variance_scale),
            ("inclusion_alpha", self.inclusion_alpha),
            ("inclusion_beta", self.inclusion_beta),
            ("slab_variance", self.slab_variance),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(BsfaError::InvalidParameter(format!(
                    "{} must be positive and finite, got {}",
                    name, value
                )));
            }
        }
        self.spike.validate(self.slab_variance)
    }
}

/// Iteration controls for the Gibbs sampler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerControls {
    /// Number of post-burn-in draws retained for inference.
    /// default: 1000
    pub sample: usize,

    /// Initial draws discarded before the chain is used downstream.
    /// default: 500
    pub burnin: usize,

    /// Thinning stride applied when extracting the retained range.
    /// default: 1
    pub lag: usize,

    /// Seed for the chain's random number generator. Runs with the same
    /// seed and configuration produce bit-identical chains.
    /// default: 0
    pub seed: u64,
}

impl Default for SamplerControls {
    fn default() -> Self {
        Self {
            sample: 1000,
            burnin: 500,
            lag: 1,
            seed: 0,
        }
    }
}

impl SamplerControls {
    /// Total number of iterations the sampler will run.
    pub fn iterations(&self) -> usize {
        self.sample + self.burnin
    }

    fn validate(&self) -> BsfaResult<()> {
        if self.sample == 0 {
            return Err(BsfaError::InvalidParameter(
                "sample must be at least 1".to_string(),
            ));
        }
        if self.lag == 0 {
            return Err(BsfaError::InvalidParameter(
                "lag must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Complete configuration for a model fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Number of latent factors. This is a required modelling choice;
    /// there is no inferred default.
    pub n_factors: usize,

    /// Coverage of the HPD intervals used for classification and
    /// summaries.
    /// default: 0.95
    #[serde(default = "default_credible_mass")]
    pub credible_mass: f64,

    /// Prior hyperparameters.
    #[serde(default)]
    pub priors: PriorConfig,

    /// Iteration controls.
    #[serde(default)]
    pub controls: SamplerControls,
}

fn default_credible_mass() -> f64 {
    0.95
}

impl ModelConfig {
    /// Create a configuration with default priors and controls for the
    /// given factor count.
    pub fn new(n_factors: usize) -> Self {
        Self {
            n_factors,
            credible_mass: default_credible_mass(),
            priors: PriorConfig::default(),
            controls: SamplerControls::default(),
        }
    }

    /// Check every hyperparameter and control setting.
    pub fn validate(&self) -> BsfaResult<()> {
        if self.n_factors == 0 {
            return Err(BsfaError::InvalidParameter(
                "n_factors must be at least 1".to_string(),
            ));
        }
        if !(self.credible_mass > 0.0 && self.credible_mass < 1.0) {
            return Err(BsfaError::InvalidParameter(format!(
                "credible_mass must lie strictly between 0 and 1, got {}",
                self.credible_mass
            )));
        }
        self.priors.validate()?;
        self.controls.validate()
    }

    /// Parse a configuration from TOML. The parsed configuration is
    /// validated before it is returned.
    pub fn from_toml_str(s: &str) -> BsfaResult<Self> {
        let config: Self = toml::from_str(s)
            .map_err(|e| BsfaError::InvalidParameter(format!("invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize this configuration to TOML.
    pub fn to_toml_string(&self) -> BsfaResult<String> {
        toml::to_string(self)
            .map_err(|e| BsfaError::InvalidParameter(format!("cannot serialize configuration: {}", e)))
    }
}
