//! # Layers - Reference Differentiable Layers
//!
//! Concrete implementations of the `converge_core::Layer` contract. They
//! are small on purpose: each one has a closed-form backward pass that the
//! verification engine can check against finite differences, and together
//! they are enough to build and train small regression networks.
//!
//! | Layer | Inputs | State |
//! |-------|--------|-------|
//! | [`Dense`] | 1 | weights `[out, in]` |
//! | [`Bias`] | 1 | bias |
//! | [`Sigmoid`], [`Square`] | 1 | none |
//! | [`MeanSqLoss`] | 2 (prediction, target) | none |
//! | [`NoiseLayer`] | 1 | none (reseedable mask) |
//! | [`DagNetwork`] | n | union of children |

pub mod activation;
pub mod bias;
pub mod dense;
pub mod loss;
pub mod network;
pub mod noise;

pub use activation::{Sigmoid, Square};
pub use bias::Bias;
pub use dense::Dense;
pub use loss::MeanSqLoss;
pub use network::{DagNetwork, NetworkNode};
pub use noise::NoiseLayer;
