//! Trainer configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::OptimError;

/// Bounds and budgets for an [`crate::IterativeTrainer`] run.
///
/// Missing fields in a JSON document fall back to the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    /// Stop after this many line-search iterations (`None` = unbounded)
    pub max_iterations: Option<usize>,
    /// Wall-clock budget for the whole run
    pub timeout: Duration,
    /// Stop once the mean loss is at or below this value
    pub terminate_threshold: f64,
    /// Inner iterations before re-sampling. Zero is treated as one.
    pub iterations_per_sample: usize,
    /// Consecutive retries allowed before the run errors out
    pub max_retries: usize,
    /// Seed for reseeding stochastic layers (`None` = from entropy)
    pub seed: Option<u64>,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            max_iterations: None,
            timeout: Duration::from_secs(5 * 60),
            terminate_threshold: 0.0,
            iterations_per_sample: 100,
            max_retries: 16,
            seed: None,
        }
    }
}

impl TrainerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self, OptimError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = Some(max);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_terminate_threshold(mut self, threshold: f64) -> Self {
        self.terminate_threshold = threshold;
        self
    }

    pub fn with_iterations_per_sample(mut self, iterations: usize) -> Self {
        self.iterations_per_sample = iterations.max(1);
        self
    }

    pub fn with_max_retries(mut self, retries: usize) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}
