//! # Batch Invariance
//!
//! Evaluating `N` identical rows must give `N` copies of the single-row
//! output, and each row's input gradient must match the single-row input
//! gradient. Layers that change the batch length (reductions over the
//! batch) are out of reach for this check and are skipped with a warning.

use converge_core::{DeltaSet, Evaluation, Layer, SlotId, Tensor, TensorList};
use tracing::{info, warn};

use crate::config::VerifyConfig;
use crate::error::VerifyError;
use crate::stats::ToleranceStatistics;

/// Outcome of a batch-invariance check.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchReport {
    Passed {
        sizes: Vec<usize>,
        statistics: ToleranceStatistics,
    },
    Skipped {
        reason: String,
    },
}

#[derive(Debug, Clone, Default)]
pub struct BatchingTester {
    config: VerifyConfig,
}

struct Pass {
    outputs: TensorList,
    /// Per input, the flattened gradient it received
    gradients: Vec<Vec<f64>>,
}

impl BatchingTester {
    pub fn new(config: VerifyConfig) -> Self {
        Self { config }
    }

    pub fn test(&self, layer: &dyn Layer, prototypes: &[Tensor]) -> Result<BatchReport, VerifyError> {
        let single = run(layer, prototypes, 1)?;
        if single.outputs.len() != 1 {
            return Ok(skip(layer, 1, single.outputs.len()));
        }

        let mut statistics = ToleranceStatistics::new();
        for &n in &self.config.batch_sizes {
            let batch = run(layer, prototypes, n)?;
            if batch.outputs.len() != n {
                return Ok(skip(layer, n, batch.outputs.len()));
            }

            for (row, out) in batch.outputs.iter().enumerate() {
                let stats = compare(out.data(), single.outputs[0].data());
                self.check(&stats, "output", n, row)?;
                statistics = statistics.combine(&stats);
            }

            for (k, (batched, one)) in batch.gradients.iter().zip(&single.gradients).enumerate() {
                // Every row must receive as much gradient as the single row did.
                if batched.len() != n * one.len() {
                    return Err(VerifyError::BatchMismatch {
                        what: format!(
                            "input[{k}] gradient length (got {}, expected {})",
                            batched.len(),
                            n * one.len()
                        ),
                        batch_size: n,
                        row: 0,
                        diff: f64::INFINITY,
                    });
                }
                if one.is_empty() {
                    continue;
                }
                for (row, chunk) in batched.chunks(one.len()).enumerate() {
                    let stats = compare(chunk, one);
                    self.check(&stats, &format!("input[{k}] gradient"), n, row)?;
                    statistics = statistics.combine(&stats);
                }
            }
        }

        info!(layer = %layer.name(), sizes = ?self.config.batch_sizes, "Batch test passed");
        Ok(BatchReport::Passed {
            sizes: self.config.batch_sizes.clone(),
            statistics,
        })
    }

    fn check(
        &self,
        stats: &ToleranceStatistics,
        what: &str,
        batch_size: usize,
        row: usize,
    ) -> Result<(), VerifyError> {
        if self.config.verify && !stats.passes(self.config.tolerance) {
            return Err(VerifyError::BatchMismatch {
                what: what.to_string(),
                batch_size,
                row,
                diff: stats.absolute.max(),
            });
        }
        Ok(())
    }
}

fn skip(layer: &dyn Layer, expected: usize, got: usize) -> BatchReport {
    let reason = format!(
        "output batch length {got} differs from input batch length {expected}"
    );
    warn!(layer = %layer.name(), %reason, "Skipping batch test");
    BatchReport::Skipped { reason }
}

fn compare(batched: &[f64], single: &[f64]) -> ToleranceStatistics {
    let mut stats = ToleranceStatistics::new();
    for (b, s) in batched.iter().zip(single) {
        stats.accept(*b, *s);
    }
    stats
}

/// Evaluate `n` copies of the prototypes and push a gradient of ones.
fn run(layer: &dyn Layer, prototypes: &[Tensor], n: usize) -> Result<Pass, VerifyError> {
    let slots: Vec<SlotId> = prototypes.iter().map(|_| SlotId::fresh()).collect();
    let inputs: Vec<Evaluation> = prototypes
        .iter()
        .zip(&slots)
        .map(|(p, s)| Evaluation::slot(TensorList::repeat(p, n), *s))
        .collect();
    let output = layer.eval(&inputs)?;

    let mut deltas = DeltaSet::new();
    output.accumulate(&mut deltas, &output.data().ones_like())?;
    let gradients = slots
        .iter()
        .map(|s| {
            deltas
                .get(*s)
                .map(|d| d.values().to_vec())
                .unwrap_or_default()
        })
        .collect();

    Ok(Pass {
        outputs: output.into_data(),
        gradients,
    })
}
