//! # Error Types
//!
//! Errors in the core contract are structural: a tensor whose buffer does
//! not fit its shape, two operands whose shapes disagree, or a layer that
//! was asked to evaluate after being disposed. None of these are retryable;
//! the optimizer and the verification engine surface them unchanged.

use thiserror::Error;

use crate::shape::Shape;

/// Core errors for tensors, delta sets and layer evaluation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CoreError {
    /// Shapes don't agree at an operation or layer boundary.
    #[error("Shape mismatch: expected {expected}, got {got}")]
    ShapeMismatch { expected: Shape, got: Shape },

    /// A buffer was handed to a shape that needs a different element count.
    #[error("Element count mismatch: shape {shape} requires {expected} elements, got {got}")]
    ElementCountMismatch {
        shape: Shape,
        expected: usize,
        got: usize,
    },

    /// A layer received the wrong number of input evaluations.
    #[error("Input count mismatch: expected {expected} inputs, got {got}")]
    InputCount { expected: usize, got: usize },

    /// Input batches disagree in length.
    #[error("Batch length mismatch: expected {expected} rows, got {got}")]
    BatchLength { expected: usize, got: usize },

    /// An operation needed at least one tensor.
    #[error("Empty batch")]
    EmptyBatch,

    /// The layer was disposed and can no longer be evaluated.
    #[error("Layer '{name}' has been disposed")]
    Disposed { name: String },

    /// Anything else that makes an evaluation structurally invalid.
    #[error("Validation failed: {reason}")]
    ValidationError { reason: String },
}

impl CoreError {
    /// Shorthand for a shape mismatch built from raw dimensions.
    pub fn shape_mismatch(expected: &[usize], got: &[usize]) -> Self {
        CoreError::ShapeMismatch {
            expected: Shape::new(expected.to_vec()),
            got: Shape::new(got.to_vec()),
        }
    }
}
