//! # Dense Layer
//!
//! A fully connected layer without bias: `y = W · x` with `W` of shape
//! `[outputs, inputs]`.
//!
//! | Direction | Formula |
//! |-----------|---------|
//! | Forward | `y[o] = Σᵢ W[o, i] · x[i]` |
//! | Input gradient | `∂L/∂x = Wᵀ · g` |
//! | Weight gradient | `∂L/∂W[o, i] += g[o] · x[i]` (summed over the batch) |

use converge_core::{
    expect_dims, expect_inputs, CoreError, Evaluation, Layer, LayerHeader, Param, Tensor,
    TensorList,
};

/// `y = W · x`.
#[derive(Debug, Clone)]
pub struct Dense {
    header: LayerHeader,
    weights: Param,
    inputs: usize,
    outputs: usize,
}

impl Dense {
    /// A zero-initialized `[outputs, inputs]` layer.
    pub fn new(inputs: usize, outputs: usize) -> Self {
        Self::build(Tensor::zeros(vec![outputs, inputs]), inputs, outputs)
    }

    /// Weights drawn uniformly from `[-scale, scale)` with a fixed seed.
    pub fn random(inputs: usize, outputs: usize, scale: f64, seed: u64) -> Self {
        Self::build(
            Tensor::random(vec![outputs, inputs], scale, seed),
            inputs,
            outputs,
        )
    }

    /// Wrap an explicit `[outputs, inputs]` weight matrix.
    pub fn from_weights(weights: Tensor) -> Result<Self, CoreError> {
        match *weights.dims() {
            [outputs, inputs] => Ok(Self::build(weights, inputs, outputs)),
            _ => Err(CoreError::ValidationError {
                reason: format!("dense weights must be rank 2, got {}", weights.shape()),
            }),
        }
    }

    fn build(weights: Tensor, inputs: usize, outputs: usize) -> Self {
        Self {
            header: LayerHeader::new(format!("dense_{inputs}x{outputs}")),
            weights: Param::new("weights", weights),
            inputs,
            outputs,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.header.name = name.into();
        self
    }

    pub fn weights(&self) -> &Param {
        &self.weights
    }

    pub fn weights_mut(&mut self) -> &mut Param {
        &mut self.weights
    }
}

fn matvec(w: &Tensor, x: &Tensor, outputs: usize, inputs: usize) -> Tensor {
    let w = w.data();
    let x = x.data();
    let y = (0..outputs)
        .map(|o| (0..inputs).map(|i| w[o * inputs + i] * x[i]).sum())
        .collect();
    Tensor::vector(y)
}

fn matvec_transposed(w: &Tensor, g: &Tensor, outputs: usize, inputs: usize) -> Tensor {
    let w = w.data();
    let g = g.data();
    let x = (0..inputs)
        .map(|i| (0..outputs).map(|o| w[o * inputs + i] * g[o]).sum())
        .collect();
    Tensor::vector(x)
}

impl Layer for Dense {
    fn header(&self) -> &LayerHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut LayerHeader {
        &mut self.header
    }

    fn state(&self) -> Vec<&Param> {
        vec![&self.weights]
    }

    fn state_mut(&mut self) -> Vec<&mut Param> {
        vec![&mut self.weights]
    }

    fn eval(&self, inputs: &[Evaluation]) -> Result<Evaluation, CoreError> {
        self.assert_alive()?;
        expect_inputs(inputs, 1)?;
        let input = inputs[0].clone();
        expect_dims(&input, &[self.inputs])?;

        let (n_in, n_out) = (self.inputs, self.outputs);
        let w = self.weights.value.clone();
        let out = input
            .data()
            .iter()
            .map(|x| matvec(&w, x, n_out, n_in))
            .collect();
        let frozen = self.is_frozen();
        let slot = self.weights.id;

        Ok(Evaluation::new(TensorList::new(out)?, move |deltas, grad| {
            if !frozen {
                let mut dw = vec![0.0; n_out * n_in];
                for (x, g) in input.data().iter().zip(grad.iter()) {
                    for o in 0..n_out {
                        let go = g.get(o);
                        for i in 0..n_in {
                            dw[o * n_in + i] += go * x.get(i);
                        }
                    }
                }
                deltas.accumulate(slot, &dw)?;
            }
            if input.is_alive() {
                let back = grad.map(|g| matvec_transposed(&w, g, n_out, n_in));
                input.accumulate(deltas, &back)?;
            }
            Ok(())
        }))
    }

    fn boxed_clone(&self) -> Box<dyn Layer> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use converge_core::{DeltaSet, SlotId};

    #[test]
    fn test_identity_forward() {
        let w = Tensor::from_data(vec![2, 2], vec![1.0, 0.0, 0.0, 1.0]).unwrap();
        let layer = Dense::from_weights(w).unwrap();
        let x = Evaluation::constant(TensorList::single(Tensor::vector(vec![1.0, -1.0])));
        let y = layer.eval(&[x]).unwrap();
        assert_eq!(y.data()[0].data(), &[1.0, -1.0]);
    }

    #[test]
    fn test_backward_transposes() {
        // W = [[1, 2, 3], [4, 5, 6]]
        let w = Tensor::from_data(vec![2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let layer = Dense::from_weights(w).unwrap();
        let slot = SlotId::fresh();
        let x = Evaluation::slot(
            TensorList::single(Tensor::vector(vec![1.0, 0.0, -1.0])),
            slot,
        );
        let y = layer.eval(&[x]).unwrap();
        assert_eq!(y.data()[0].data(), &[-2.0, -2.0]);

        let mut deltas = DeltaSet::new();
        let g = TensorList::single(Tensor::vector(vec![1.0, 0.0]));
        y.accumulate(&mut deltas, &g).unwrap();
        assert_eq!(deltas.get(slot).unwrap().values(), &[1.0, 2.0, 3.0]);
        assert_eq!(
            deltas.get(layer.weights().id).unwrap().values(),
            &[1.0, 0.0, -1.0, 0.0, 0.0, 0.0]
        );
    }

    #[test]
    fn test_rejects_wrong_input_dims() {
        let layer = Dense::new(3, 2);
        let x = Evaluation::constant(TensorList::single(Tensor::vector(vec![1.0, 2.0])));
        assert!(matches!(
            layer.eval(&[x]),
            Err(CoreError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_from_weights_requires_matrix() {
        assert!(Dense::from_weights(Tensor::vector(vec![1.0])).is_err());
    }
}
