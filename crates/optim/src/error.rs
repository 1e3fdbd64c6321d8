//! # Error Types
//!
//! Only two outcomes of a training run are errors: the monitor refusing to
//! retry a non-finite measurement, and the retry budget running out. Every
//! other way a run can end (timeout, iteration cap, a vetoed step) is a
//! normal [`crate::TrainingResult`] with a termination cause.

use converge_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OptimError {
    /// A measurement was non-finite and the monitor refused to retry.
    #[error("Training stopped: non-finite mean loss {mean}")]
    Stopped { mean: f64 },

    /// More consecutive retries than the configured budget allows.
    #[error("Retry budget exhausted after {attempts} attempts")]
    RetryBudgetExhausted { attempts: usize },

    /// The trainable has no data rows to evaluate.
    #[error("Nothing to optimize: {reason}")]
    NothingToOptimize { reason: String },

    #[error("Core error: {0}")]
    Core(#[from] CoreError),

    #[error("Invalid trainer config: {0}")]
    Config(#[from] serde_json::Error),
}
