//! # Element-wise Activations
//!
//! Stateless layers that apply a scalar function to every element.
//!
//! | Layer | Forward | Derivative |
//! |-------|---------|------------|
//! | Sigmoid | `1 / (1 + e^-x)` | `y (1 - y)` |
//! | Square | `x²` | `2x` |

use converge_core::{expect_inputs, CoreError, Evaluation, Layer, LayerHeader, Param, TensorList};

/// Forward `f` and backward `g * df(x, y)` for a one-input element-wise layer.
fn elementwise(
    input: &Evaluation,
    f: fn(f64) -> f64,
    df: fn(f64, f64) -> f64,
) -> Result<Evaluation, CoreError> {
    let input = input.clone();
    let out = input.data().map(|x| x.map(f));
    let cached = out.clone();

    Ok(Evaluation::new(out, move |deltas, grad| {
        if !input.is_alive() {
            return Ok(());
        }
        let items = input
            .data()
            .iter()
            .zip(cached.iter())
            .zip(grad.iter())
            .map(|((x, y), g)| {
                let local = x.zip_with(y, df)?;
                local.mul(g)
            })
            .collect::<Result<Vec<_>, _>>()?;
        input.accumulate(deltas, &TensorList::new(items)?)
    }))
}

macro_rules! activation {
    ($(#[$doc:meta])* $name:ident, $label:literal, $f:expr, $df:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone)]
        pub struct $name {
            header: LayerHeader,
        }

        impl $name {
            pub fn new() -> Self {
                Self {
                    header: LayerHeader::new($label),
                }
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl Layer for $name {
            fn header(&self) -> &LayerHeader {
                &self.header
            }

            fn header_mut(&mut self) -> &mut LayerHeader {
                &mut self.header
            }

            fn state(&self) -> Vec<&Param> {
                Vec::new()
            }

            fn state_mut(&mut self) -> Vec<&mut Param> {
                Vec::new()
            }

            fn eval(&self, inputs: &[Evaluation]) -> Result<Evaluation, CoreError> {
                self.assert_alive()?;
                expect_inputs(inputs, 1)?;
                elementwise(&inputs[0], $f, $df)
            }

            fn boxed_clone(&self) -> Box<dyn Layer> {
                Box::new(self.clone())
            }
        }
    };
}

activation!(
    /// Logistic sigmoid.
    Sigmoid,
    "sigmoid",
    |x| 1.0 / (1.0 + (-x).exp()),
    |_, y| y * (1.0 - y)
);

activation!(
    /// `y = x²`.
    Square,
    "square",
    |x| x * x,
    |x, _| 2.0 * x
);

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use converge_core::{DeltaSet, SlotId, Tensor};

    #[test]
    fn test_sigmoid_at_zero() {
        let slot = SlotId::fresh();
        let x = Evaluation::slot(TensorList::single(Tensor::vector(vec![0.0])), slot);
        let y = Sigmoid::new().eval(&[x]).unwrap();
        assert_abs_diff_eq!(y.data()[0].get(0), 0.5);

        let mut deltas = DeltaSet::new();
        y.accumulate(&mut deltas, &y.data().ones_like()).unwrap();
        assert_abs_diff_eq!(deltas.get(slot).unwrap().values()[0], 0.25);
    }

    #[test]
    fn test_square_gradient() {
        let slot = SlotId::fresh();
        let x = Evaluation::slot(TensorList::single(Tensor::vector(vec![3.0, -2.0])), slot);
        let y = Square::new().eval(&[x]).unwrap();
        assert_eq!(y.data()[0].data(), &[9.0, 4.0]);

        let mut deltas = DeltaSet::new();
        y.accumulate(&mut deltas, &y.data().ones_like()).unwrap();
        assert_eq!(deltas.get(slot).unwrap().values(), &[6.0, -4.0]);
    }

    #[test]
    fn test_constant_input_is_not_propagated() {
        let x = Evaluation::constant(TensorList::single(Tensor::vector(vec![1.0])));
        let y = Square::new().eval(&[x]).unwrap();
        let mut deltas = DeltaSet::new();
        y.accumulate(&mut deltas, &y.data().ones_like()).unwrap();
        assert!(deltas.is_empty());
    }
}
