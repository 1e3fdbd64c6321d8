//! # Core - Tensors, Deltas and the Layer Contract
//!
//! This crate provides the data model every other crate in the workspace
//! builds on:
//!
//! - **Shapes / Tensors**: dense `f64` arrays with explicit dimensions
//! - **Tensor lists**: mini-batches flowing between layers
//! - **Deltas**: gradient buffers keyed by parameter slot, summed on accumulation
//! - **Layers / Evaluations**: differentiable functions and their backward closures
//! - **Timing**: wall-clock measurement of a single computation
//!
//! ## Design Philosophy
//!
//! A layer never hands out a gradient directly. It hands out an evaluation
//! whose accumulator, given an output gradient, writes chain-rule
//! contributions into a caller-owned `DeltaSet`. Everything downstream
//! (gradient verification, line search, the trainer) is written against
//! that one contract.

pub mod delta;
pub mod error;
pub mod evaluation;
pub mod layer;
pub mod shape;
pub mod tensor;
pub mod tensor_list;
pub mod timed;

// Re-export key types at crate root for convenience
pub use delta::{Delta, DeltaSet, SlotId, StateSet};
pub use error::CoreError;
pub use evaluation::{Accumulator, Evaluation};
pub use layer::{expect_dims, expect_inputs, Layer, LayerHeader, LayerId, Param};
pub use shape::Shape;
pub use tensor::Tensor;
pub use tensor_list::TensorList;
pub use timed::TimedResult;
