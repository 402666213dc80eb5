use thiserror::Error;

/// Error type for invalid model inputs and sampling failures.
#[derive(Error, Debug)]
pub enum BsfaError {
    /// A hyperparameter or control setting is outside its valid range.
    #[error("{0}")]
    InvalidParameter(String),

    /// The data matrix cannot support the requested factor count.
    #[error("data matrix ({n_vars} variables x {n_samples} samples) is incompatible with {n_factors} factors: {reason}")]
    Shape {
        n_vars: usize,
        n_samples: usize,
        n_factors: usize,
        reason: String,
    },

    /// A conditional draw produced a singular system or non-finite values.
    /// Repeating the run with identical inputs will not fix a structural
    /// issue; the caller must adjust the data or configuration.
    #[error("numerical instability at iteration {iteration} while updating {quantity}: {detail}")]
    NumericalInstability {
        iteration: usize,
        quantity: &'static str,
        detail: String,
    },

    /// A summary was requested over fewer draws than the statistic needs.
    #[error("insufficient posterior draws: got {got}, need at least {needed}")]
    InsufficientDraws { needed: usize, got: usize },

    /// Chain persistence failed.
    #[error("chain I/O failed: {0}")]
    ChainIo(String),
}

/// Convenience type for `Result<T, BsfaError>`.
pub type BsfaResult<T> = Result<T, BsfaError>;
