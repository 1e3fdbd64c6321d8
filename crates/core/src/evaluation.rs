//! # Evaluations
//!
//! An evaluation pairs a forward value with an accumulator: a closure
//! `(DeltaSet, output_gradient)` that computes the local chain-rule
//! contribution and passes it upstream. Calling the accumulator with a
//! one-hot output gradient yields one column of the analytic Jacobian with
//! respect to everything reachable from that evaluation.
//!
//! Accumulators run synchronously and only ever write into the `DeltaSet`
//! they are handed.
//!
//! ```rust
//! use converge_core::{DeltaSet, Evaluation, SlotId, Tensor, TensorList};
//!
//! let slot = SlotId::fresh();
//! let x = Evaluation::slot(TensorList::single(Tensor::vector(vec![1.0, 2.0])), slot);
//!
//! let mut deltas = DeltaSet::new();
//! x.accumulate(&mut deltas, &TensorList::single(Tensor::vector(vec![0.0, 1.0])))
//!     .unwrap();
//! assert_eq!(deltas.get(slot).unwrap().values(), &[0.0, 1.0]);
//! ```

use std::fmt;
use std::rc::Rc;

use crate::delta::{DeltaSet, SlotId};
use crate::error::CoreError;
use crate::tensor_list::TensorList;

/// Backward closure of an evaluation.
pub type Accumulator = Rc<dyn Fn(&mut DeltaSet, &TensorList) -> Result<(), CoreError>>;

/// A forward value plus its backward accumulator.
#[derive(Clone)]
pub struct Evaluation {
    data: TensorList,
    accumulator: Accumulator,
    alive: bool,
}

impl Evaluation {
    /// A live evaluation with the given backward closure.
    pub fn new<F>(data: TensorList, accumulator: F) -> Self
    where
        F: Fn(&mut DeltaSet, &TensorList) -> Result<(), CoreError> + 'static,
    {
        Self {
            data,
            accumulator: Rc::new(accumulator),
            alive: true,
        }
    }

    /// A leaf that needs no gradient (training data, targets).
    pub fn constant(data: TensorList) -> Self {
        Self {
            data,
            accumulator: Rc::new(|_, _| Ok(())),
            alive: false,
        }
    }

    /// A live leaf that records the gradient it receives under `slot`.
    ///
    /// Rows are concatenated, so a batch of `n` items of `k` elements
    /// records `n * k` values.
    pub fn slot(data: TensorList, slot: SlotId) -> Self {
        Self::new(data, move |deltas, gradient| {
            let flat: Vec<f64> = gradient
                .iter()
                .flat_map(|t| t.data().iter().copied())
                .collect();
            deltas.accumulate(slot, &flat)
        })
    }

    pub fn data(&self) -> &TensorList {
        &self.data
    }

    pub fn into_data(self) -> TensorList {
        self.data
    }

    /// Whether further backward propagation is required.
    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// Run the backward closure for `gradient`, which must match the
    /// forward value's batch length and item dimensions.
    pub fn accumulate(&self, deltas: &mut DeltaSet, gradient: &TensorList) -> Result<(), CoreError> {
        if gradient.len() != self.data.len() {
            return Err(CoreError::BatchLength {
                expected: self.data.len(),
                got: gradient.len(),
            });
        }
        if !gradient.is_empty() && gradient.dims() != self.data.dims() {
            return Err(CoreError::shape_mismatch(self.data.dims(), gradient.dims()));
        }
        (self.accumulator)(deltas, gradient)
    }
}

impl fmt::Debug for Evaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Evaluation")
            .field("data", &self.data)
            .field("alive", &self.alive)
            .finish()
    }
}
