//! # Layers
//!
//! The abstract differentiable-function interface every layer implements.
//!
//! A layer is a named function over tensor batches with an optional list of
//! learnable parameter arrays (its `state()`). Evaluating a layer produces an
//! [`Evaluation`]: the forward value plus a backward closure which, handed an
//! output gradient, computes the local chain-rule contribution and forwards
//! it to its inputs and to the layer's own parameter slots.
//!
//! ## Frozen layers
//!
//! A frozen layer must not emit deltas for its own parameters but still
//! propagates gradient to its inputs. The flag is captured at evaluation
//! time, so freezing a layer after `eval` does not change an evaluation that
//! already exists.
//!
//! ## Copies
//!
//! `boxed_clone` is a deep copy that keeps parameter identities: a delta
//! produced by the copy targets the same [`SlotId`]s as the original. This
//! is what lets the verification engine unfreeze a throwaway copy and still
//! read gradients by the original's slots.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::delta::SlotId;
use crate::error::CoreError;
use crate::evaluation::Evaluation;
use crate::tensor::Tensor;

/// Identity of a layer instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LayerId(u64);

impl LayerId {
    pub fn fresh() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        LayerId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// A learnable parameter array owned by a layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    /// Delta key for this array
    pub id: SlotId,
    /// Human-readable name ("weights", "bias", ...)
    pub name: String,
    /// Current value
    pub value: Tensor,
}

impl Param {
    /// A parameter with a freshly allocated slot.
    pub fn new(name: impl Into<String>, value: Tensor) -> Self {
        Self {
            id: SlotId::fresh(),
            name: name.into(),
            value,
        }
    }

    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

/// Bookkeeping shared by every layer: identity, name, frozen and disposed flags.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerHeader {
    pub id: LayerId,
    pub name: String,
    pub frozen: bool,
    pub disposed: bool,
}

impl LayerHeader {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: LayerId::fresh(),
            name: name.into(),
            frozen: false,
            disposed: false,
        }
    }
}

/// A differentiable function over tensor batches.
pub trait Layer: fmt::Debug {
    fn header(&self) -> &LayerHeader;

    fn header_mut(&mut self) -> &mut LayerHeader;

    /// Learnable parameter arrays, in a stable order. Empty if stateless.
    fn state(&self) -> Vec<&Param>;

    /// Mutable access to the same arrays, in the same order.
    fn state_mut(&mut self) -> Vec<&mut Param>;

    /// Forward evaluation. The returned evaluation owns a backward closure
    /// that captures whatever it needs; it never borrows the layer.
    fn eval(&self, inputs: &[Evaluation]) -> Result<Evaluation, CoreError>;

    /// Deep copy preserving parameter identities.
    fn boxed_clone(&self) -> Box<dyn Layer>;

    fn name(&self) -> &str {
        &self.header().name
    }

    fn id(&self) -> LayerId {
        self.header().id
    }

    fn is_frozen(&self) -> bool {
        self.header().frozen
    }

    /// Composite layers override this to reach their children.
    fn set_frozen(&mut self, frozen: bool) {
        self.header_mut().frozen = frozen;
    }

    fn freeze(&mut self) {
        self.set_frozen(true);
    }

    /// Mark the layer unusable; later evaluations fail.
    fn dispose(&mut self) {
        self.header_mut().disposed = true;
    }

    fn assert_alive(&self) -> Result<(), CoreError> {
        if self.header().disposed {
            return Err(CoreError::Disposed {
                name: self.name().to_string(),
            });
        }
        Ok(())
    }

    /// Re-randomize stochastic components. Returns true if anything changed.
    fn reseed(&mut self, _seed: u64) -> bool {
        false
    }

    /// Drop any stochastic noise state, restoring deterministic behavior.
    fn clear_noise(&mut self) {}

    /// Total number of learnable scalars.
    fn num_parameters(&self) -> usize {
        self.state().iter().map(|p| p.len()).sum()
    }
}

impl Clone for Box<dyn Layer> {
    fn clone(&self) -> Self {
        self.boxed_clone()
    }
}

/// Check the number of inputs a layer received.
pub fn expect_inputs(inputs: &[Evaluation], expected: usize) -> Result<(), CoreError> {
    if inputs.len() != expected {
        return Err(CoreError::InputCount {
            expected,
            got: inputs.len(),
        });
    }
    Ok(())
}

/// Check that an input batch has the item dimensions a layer needs.
pub fn expect_dims(input: &Evaluation, expected: &[usize]) -> Result<(), CoreError> {
    let got = input.data().dims();
    if !input.data().is_empty() && got != expected {
        return Err(CoreError::shape_mismatch(expected, got));
    }
    Ok(())
}
