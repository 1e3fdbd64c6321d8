//! # Verify - Finite-Difference Gradient Verification
//!
//! Checks that a layer's backward pass agrees with what its forward pass
//! implies, and that it honors the frozen-parameter contract.
//!
//! - **Derivative**: feedback (input) and learning (parameter) Jacobians,
//!   analytic against numeric, with tolerance pass/fail
//! - **Batching**: `N` identical rows behave like one
//! - **Performance**: forward and backward timing, diagnostic only
//! - **Suites**: run the above as one battery
//!
//! ## Example
//!
//! ```rust
//! use converge_core::Tensor;
//! use converge_layers::Dense;
//! use converge_verify::{DerivativeTester, VerifyConfig};
//!
//! let layer = Dense::random(3, 2, 1.0, 7);
//! let tester = DerivativeTester::new(VerifyConfig::default());
//! let stats = tester.test(&layer, &[Tensor::vector(vec![0.5, -0.5, 1.0])]).unwrap();
//! assert!(stats.passes(1e-3));
//! ```

pub mod batching;
pub mod config;
pub mod derivative;
pub mod error;
pub mod performance;
pub mod report;
pub mod stats;
pub mod suite;

pub use batching::{BatchReport, BatchingTester};
pub use config::VerifyConfig;
pub use derivative::DerivativeTester;
pub use error::VerifyError;
pub use performance::{PerformanceReport, PerformanceTester};
pub use report::{GradientReport, ToleranceFailure};
pub use stats::{DoubleStatistics, ToleranceStatistics};
pub use suite::{random_inputs, ComponentTest, TestSuite};
