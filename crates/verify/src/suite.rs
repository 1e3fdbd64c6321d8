//! # Component Test Suites
//!
//! A uniform interface over the individual testers so callers can run a
//! standard battery against any layer and collect one summary line each.

use converge_core::{Layer, Tensor};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{info, warn};

use crate::batching::{BatchReport, BatchingTester};
use crate::config::VerifyConfig;
use crate::derivative::DerivativeTester;
use crate::error::VerifyError;
use crate::performance::PerformanceTester;

/// One check that can be run against a layer.
pub trait ComponentTest {
    fn name(&self) -> &str;

    /// Run the check, returning a one-line summary on success.
    fn test(&self, layer: &dyn Layer, prototypes: &[Tensor]) -> Result<String, VerifyError>;
}

impl ComponentTest for DerivativeTester {
    fn name(&self) -> &str {
        "derivative"
    }

    fn test(&self, layer: &dyn Layer, prototypes: &[Tensor]) -> Result<String, VerifyError> {
        let stats = DerivativeTester::test(self, layer, prototypes)?;
        Ok(format!("{stats}"))
    }
}

impl ComponentTest for BatchingTester {
    fn name(&self) -> &str {
        "batching"
    }

    fn test(&self, layer: &dyn Layer, prototypes: &[Tensor]) -> Result<String, VerifyError> {
        Ok(match BatchingTester::test(self, layer, prototypes)? {
            BatchReport::Passed { sizes, statistics } => {
                format!("sizes {sizes:?}: {statistics}")
            }
            BatchReport::Skipped { reason } => format!("skipped: {reason}"),
        })
    }
}

impl ComponentTest for PerformanceTester {
    fn name(&self) -> &str {
        "performance"
    }

    fn test(&self, layer: &dyn Layer, prototypes: &[Tensor]) -> Result<String, VerifyError> {
        let report = PerformanceTester::test(self, layer, prototypes)?;
        Ok(format!(
            "forward {:.3e}s, backward {:.3e}s",
            report.forward.mean(),
            report.backward.mean()
        ))
    }
}

/// An ordered list of component tests.
#[derive(Default)]
pub struct TestSuite {
    tests: Vec<Box<dyn ComponentTest>>,
}

impl TestSuite {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derivative, batching and performance tests configured from `config`.
    pub fn standard(config: &VerifyConfig) -> Self {
        let batch = config.batch_sizes.iter().copied().max().unwrap_or(1);
        Self::new()
            .with_test(DerivativeTester::new(config.clone()))
            .with_test(BatchingTester::new(config.clone()))
            .with_test(PerformanceTester::new(config.performance_samples, batch))
    }

    pub fn with_test(mut self, test: impl ComponentTest + 'static) -> Self {
        self.tests.push(Box::new(test));
        self
    }

    pub fn len(&self) -> usize {
        self.tests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    /// Run every test in order, stopping at the first failure.
    pub fn run(
        &self,
        layer: &dyn Layer,
        prototypes: &[Tensor],
    ) -> Result<Vec<(String, String)>, VerifyError> {
        let mut summaries = Vec::with_capacity(self.tests.len());
        for test in &self.tests {
            match test.test(layer, prototypes) {
                Ok(summary) => {
                    info!(layer = %layer.name(), test = test.name(), %summary, "Component test passed");
                    summaries.push((test.name().to_string(), summary));
                }
                Err(e) => {
                    warn!(layer = %layer.name(), test = test.name(), error = %e, "Component test failed");
                    return Err(e);
                }
            }
        }
        Ok(summaries)
    }
}

/// Uniform `[-1, 1)` prototypes, one per entry of `dims`.
pub fn random_inputs(dims: &[Vec<usize>], seed: u64) -> Vec<Tensor> {
    let mut rng = StdRng::seed_from_u64(seed);
    dims.iter()
        .map(|d| {
            let seed = rng.gen::<u64>();
            Tensor::random(d.clone(), 1.0, seed)
        })
        .collect()
}
