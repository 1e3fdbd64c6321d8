//! Forward/backward timing probe. Diagnostic only; it never fails a layer
//! for being slow.

use converge_core::{DeltaSet, Evaluation, Layer, Tensor, TensorList, TimedResult};
use tracing::info;

use crate::error::VerifyError;
use crate::stats::DoubleStatistics;

/// Seconds per forward and per backward pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerformanceReport {
    pub forward: DoubleStatistics,
    pub backward: DoubleStatistics,
}

#[derive(Debug, Clone)]
pub struct PerformanceTester {
    samples: usize,
    batch_size: usize,
}

impl Default for PerformanceTester {
    fn default() -> Self {
        Self::new(10, 1)
    }
}

impl PerformanceTester {
    pub fn new(samples: usize, batch_size: usize) -> Self {
        Self {
            samples,
            batch_size: batch_size.max(1),
        }
    }

    pub fn test(
        &self,
        layer: &dyn Layer,
        prototypes: &[Tensor],
    ) -> Result<PerformanceReport, VerifyError> {
        let mut forward = DoubleStatistics::new();
        let mut backward = DoubleStatistics::new();

        for _ in 0..self.samples {
            let inputs: Vec<Evaluation> = prototypes
                .iter()
                .map(|p| Evaluation::constant(TensorList::repeat(p, self.batch_size)))
                .collect();
            let evaluated = TimedResult::time(|| layer.eval(&inputs)).transpose()?;
            forward.accept(evaluated.seconds());

            let output = evaluated.result;
            let gradient = output.data().ones_like();
            let mut deltas = DeltaSet::new();
            let timed = TimedResult::time(|| output.accumulate(&mut deltas, &gradient));
            timed.result?;
            backward.accept(timed.time.as_secs_f64());
        }

        info!(
            layer = %layer.name(),
            batch = self.batch_size,
            forward = %forward,
            backward = %backward,
            "Performance"
        );
        Ok(PerformanceReport { forward, backward })
    }
}
