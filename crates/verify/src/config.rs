//! Verification configuration.

use serde::{Deserialize, Serialize};

use crate::error::VerifyError;

/// Knobs for the derivative, batching and performance testers.
///
/// Missing fields in a JSON document fall back to the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifyConfig {
    /// Largest allowed absolute difference between numeric and analytic entries
    pub tolerance: f64,
    /// Forward-difference step
    pub probe_size: f64,
    /// Check gradients with respect to inputs
    pub test_feedback: bool,
    /// Check gradients with respect to learnable parameters
    pub test_learning: bool,
    /// When false, statistics are reported but never fail the check
    pub verify: bool,
    /// Log full matrices at debug level
    pub verbose: bool,
    /// Batch sizes for the batch-invariance check
    pub batch_sizes: Vec<usize>,
    /// Repetitions for the performance probe
    pub performance_samples: usize,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-3,
            probe_size: 1e-4,
            test_feedback: true,
            test_learning: true,
            verify: true,
            verbose: false,
            batch_sizes: vec![1, 2, 10],
            performance_samples: 10,
        }
    }
}

impl VerifyConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self, VerifyError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_probe_size(mut self, probe_size: f64) -> Self {
        self.probe_size = probe_size;
        self
    }

    pub fn with_feedback(mut self, enabled: bool) -> Self {
        self.test_feedback = enabled;
        self
    }

    pub fn with_learning(mut self, enabled: bool) -> Self {
        self.test_learning = enabled;
        self
    }

    pub fn with_verify(mut self, enabled: bool) -> Self {
        self.verify = enabled;
        self
    }

    pub fn with_verbose(mut self, enabled: bool) -> Self {
        self.verbose = enabled;
        self
    }

    pub fn with_batch_sizes(mut self, sizes: Vec<usize>) -> Self {
        self.batch_sizes = sizes;
        self
    }

    pub fn with_performance_samples(mut self, samples: usize) -> Self {
        self.performance_samples = samples;
        self
    }
}
