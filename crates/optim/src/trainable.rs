//! # Trainables
//!
//! A trainable binds a loss layer to its data and produces
//! [`PointSample`]s: the mean loss over the rows, the gradient of that mean
//! with respect to every unfrozen parameter, and a snapshot of the weights
//! it was measured at.
//!
//! The layer's output must be one scalar loss per row. Each data row holds
//! one tensor per layer input; rows are transposed into one constant
//! [`TensorList`] per input, so data never receives gradient.

use converge_core::{DeltaSet, Evaluation, Layer, StateSet, Tensor, TensorList};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::debug;

use crate::error::OptimError;
use crate::monitor::TrainingMonitor;
use crate::sample::PointSample;

/// Something the trainer can measure and move.
pub trait Trainable {
    /// Evaluate the loss and its gradient at the current weights.
    fn measure(&mut self, monitor: &mut dyn TrainingMonitor) -> Result<PointSample, OptimError>;

    /// Re-randomize stochastic state. Returns true if the loss surface changed.
    fn reseed(&mut self, seed: u64) -> bool;

    fn layer(&self) -> &dyn Layer;

    fn layer_mut(&mut self) -> &mut dyn Layer;

    fn clear_noise(&mut self) {
        self.layer_mut().clear_noise();
    }
}

/// Measure `layer` over `rows` as one batch.
fn measure_rows(layer: &dyn Layer, rows: &[&[Tensor]]) -> Result<PointSample, OptimError> {
    let Some(first) = rows.first() else {
        return Err(OptimError::NothingToOptimize {
            reason: format!("no data rows for {}", layer.name()),
        });
    };
    let columns = first.len();
    if let Some(bad) = rows.iter().find(|r| r.len() != columns) {
        return Err(OptimError::NothingToOptimize {
            reason: format!("ragged data: expected {columns} tensors per row, got {}", bad.len()),
        });
    }

    let inputs = (0..columns)
        .map(|c| {
            let column = rows.iter().map(|r| r[c].clone()).collect();
            TensorList::new(column).map(Evaluation::constant)
        })
        .collect::<Result<Vec<_>, _>>()?;

    let output = layer.eval(&inputs)?;
    let sum = output.data().sum();
    let count = rows.len();

    let mut gradient = DeltaSet::new();
    output.accumulate(&mut gradient, &output.data().ones_like())?;
    let delta = gradient.scale(1.0 / count as f64);

    Ok(PointSample::new(delta, StateSet::capture(layer), sum, count))
}

// ============================================================================
// Basic Trainable
// ============================================================================

/// Evaluates every row on each measurement.
#[derive(Debug, Clone)]
pub struct BasicTrainable {
    layer: Box<dyn Layer>,
    data: Vec<Vec<Tensor>>,
}

impl BasicTrainable {
    pub fn new(layer: impl Layer + 'static, data: Vec<Vec<Tensor>>) -> Self {
        Self::from_boxed(Box::new(layer), data)
    }

    pub fn from_boxed(layer: Box<dyn Layer>, data: Vec<Vec<Tensor>>) -> Self {
        Self { layer, data }
    }

    pub fn data(&self) -> &[Vec<Tensor>] {
        &self.data
    }

    pub fn into_layer(self) -> Box<dyn Layer> {
        self.layer
    }
}

impl Trainable for BasicTrainable {
    fn measure(&mut self, _monitor: &mut dyn TrainingMonitor) -> Result<PointSample, OptimError> {
        let rows: Vec<&[Tensor]> = self.data.iter().map(Vec::as_slice).collect();
        measure_rows(self.layer.as_ref(), &rows)
    }

    fn reseed(&mut self, seed: u64) -> bool {
        self.layer.reseed(seed)
    }

    fn layer(&self) -> &dyn Layer {
        self.layer.as_ref()
    }

    fn layer_mut(&mut self) -> &mut dyn Layer {
        self.layer.as_mut()
    }
}

// ============================================================================
// Sampled Trainable
// ============================================================================

/// Evaluates a random subset of `sample_size` rows. The subset is redrawn
/// on every `reseed`; until the first reseed it is the leading rows.
#[derive(Debug, Clone)]
pub struct SampledTrainable {
    layer: Box<dyn Layer>,
    data: Vec<Vec<Tensor>>,
    sample_size: usize,
    indices: Vec<usize>,
}

impl SampledTrainable {
    pub fn new(layer: impl Layer + 'static, data: Vec<Vec<Tensor>>, sample_size: usize) -> Self {
        let indices = (0..sample_size.min(data.len())).collect();
        Self {
            layer: Box::new(layer),
            data,
            sample_size,
            indices,
        }
    }

    pub fn sample_size(&self) -> usize {
        self.sample_size
    }

    /// Row indices of the current subset.
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn into_layer(self) -> Box<dyn Layer> {
        self.layer
    }
}

impl Trainable for SampledTrainable {
    fn measure(&mut self, _monitor: &mut dyn TrainingMonitor) -> Result<PointSample, OptimError> {
        let rows: Vec<&[Tensor]> = self
            .indices
            .iter()
            .map(|&i| self.data[i].as_slice())
            .collect();
        measure_rows(self.layer.as_ref(), &rows)
    }

    fn reseed(&mut self, seed: u64) -> bool {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut indices: Vec<usize> = (0..self.data.len()).collect();
        indices.shuffle(&mut rng);
        indices.truncate(self.sample_size);

        let resampled = indices != self.indices;
        self.indices = indices;
        debug!(
            sample_size = self.indices.len(),
            rows = self.data.len(),
            resampled,
            "Redrew training subset"
        );
        let layer_changed = self.layer.reseed(seed);
        resampled || layer_changed
    }

    fn layer(&self) -> &dyn Layer {
        self.layer.as_ref()
    }

    fn layer_mut(&mut self) -> &mut dyn Layer {
        self.layer.as_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::NullMonitor;
    use converge_core::{LayerHeader, Param};

    /// `loss = w · x` per row, with a single learnable `w`.
    #[derive(Debug, Clone)]
    struct Linear {
        header: LayerHeader,
        w: Param,
    }

    impl Linear {
        fn new(w: f64) -> Self {
            Self {
                header: LayerHeader::new("linear"),
                w: Param::new("w", Tensor::vector(vec![w])),
            }
        }
    }

    impl Layer for Linear {
        fn header(&self) -> &LayerHeader {
            &self.header
        }

        fn header_mut(&mut self) -> &mut LayerHeader {
            &mut self.header
        }

        fn state(&self) -> Vec<&Param> {
            vec![&self.w]
        }

        fn state_mut(&mut self) -> Vec<&mut Param> {
            vec![&mut self.w]
        }

        fn eval(&self, inputs: &[Evaluation]) -> Result<Evaluation, converge_core::CoreError> {
            let input = inputs[0].clone();
            let w = self.w.value.get(0);
            let slot = self.w.id;
            let frozen = self.is_frozen();
            let out = input.data().map(|x| x.scale(w));
            Ok(Evaluation::new(out, move |deltas, grad| {
                if frozen {
                    return Ok(());
                }
                let dw: f64 = input
                    .data()
                    .iter()
                    .zip(grad.iter())
                    .map(|(x, g)| x.get(0) * g.get(0))
                    .sum();
                deltas.accumulate(slot, &[dw])
            }))
        }

        fn boxed_clone(&self) -> Box<dyn Layer> {
            Box::new(self.clone())
        }
    }

    fn rows(xs: &[f64]) -> Vec<Vec<Tensor>> {
        xs.iter().map(|&x| vec![Tensor::scalar(x)]).collect()
    }

    #[test]
    fn test_basic_measures_mean_gradient() {
        let layer = Linear::new(2.0);
        let slot = layer.w.id;
        let mut trainable = BasicTrainable::new(layer, rows(&[1.0, 2.0, 3.0]));
        let point = trainable.measure(&mut NullMonitor).unwrap();
        assert_eq!(point.count, 3);
        assert_eq!(point.sum, 12.0);
        assert_eq!(point.mean(), 4.0);
        // d(mean)/dw = mean(x)
        assert_eq!(point.delta.get(slot).unwrap().values(), &[2.0]);
        assert_eq!(point.weights.get(slot).unwrap(), &[2.0]);
    }

    #[test]
    fn test_empty_data_is_an_error() {
        let mut trainable = BasicTrainable::new(Linear::new(1.0), Vec::new());
        assert!(matches!(
            trainable.measure(&mut NullMonitor),
            Err(OptimError::NothingToOptimize { .. })
        ));
    }

    #[test]
    fn test_frozen_layer_has_no_gradient() {
        let mut layer = Linear::new(1.0);
        layer.freeze();
        let mut trainable = BasicTrainable::new(layer, rows(&[1.0]));
        let point = trainable.measure(&mut NullMonitor).unwrap();
        assert!(point.is_finite());
        assert!(point.delta.is_empty());
        assert_eq!(point.weights.len(), 1);
        assert!(!trainable.reseed(7));
    }

    #[test]
    fn test_sampled_draws_subset() {
        let data = rows(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let mut trainable = SampledTrainable::new(Linear::new(1.0), data, 2);
        assert_eq!(trainable.indices(), &[0, 1]);
        assert_eq!(trainable.measure(&mut NullMonitor).unwrap().count, 2);

        trainable.reseed(11);
        let first = trainable.indices().to_vec();
        assert_eq!(first.len(), 2);
        trainable.reseed(11);
        assert_eq!(trainable.indices(), first.as_slice());

        let point = trainable.measure(&mut NullMonitor).unwrap();
        let expected: f64 = first.iter().map(|&i| (i + 1) as f64).sum();
        assert_eq!(point.sum, expected);
    }
}
