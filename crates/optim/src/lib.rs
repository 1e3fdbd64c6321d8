//! # Optim - Iterative Optimization Driver
//!
//! Trains a [`Trainable`] by repeated orient / line search / decide steps,
//! under wall-clock, iteration and loss-threshold bounds.
//!
//! - **Trainables**: a loss layer bound to its data, measured as a
//!   [`PointSample`] (mean loss, gradient, weight snapshot)
//! - **Orientations**: steepest descent, L-BFGS, momentum
//! - **Line searches**: Armijo-Wolfe, quadratic interpolation, static rate
//! - **Cursors**: move along a direction; the failsafe cursor keeps the best point
//! - **Monitors**: observe the run and decide whether failures may be retried
//!
//! ## Key Concepts
//!
//! Non-finite losses and failed steps are not errors by themselves. They
//! are reported to the [`TrainingMonitor`], which either permits a retry
//! from a fresh sample or ends the run. Retries are capped by
//! [`TrainerConfig::max_retries`].

pub mod config;
pub mod cursor;
pub mod error;
pub mod line_search;
pub mod monitor;
pub mod orientation;
pub mod sample;
pub mod trainable;
pub mod trainer;

pub use config::TrainerConfig;
pub use cursor::{FailsafeCursor, LineSearchCursor, LineSearchPoint, SimpleCursor};
pub use error::OptimError;
pub use line_search::{ArmijoWolfe, LineSearch, QuadraticSearch, StaticRate};
pub use monitor::{
    CompositeMonitor, HistoryMonitor, HistoryRecord, LoggingMonitor, NullMonitor,
    RetryingMonitor, SubMonitor, TrainingMonitor,
};
pub use orientation::{LbfgsState, LineSearchDirection, MomentumState, Orientation};
pub use sample::{PointSample, Step};
pub use trainable::{BasicTrainable, SampledTrainable, Trainable};
pub use trainer::{IterativeTrainer, LineSearchFactory, TerminationCause, TrainingResult};
