//! # Error Types
//!
//! Verification failures are fatal: a gradient outside tolerance or a
//! frozen/unfrozen contract violation means the layer is wrong, and no
//! retry will fix it. Structural problems from the layer itself surface as
//! [`VerifyError::Core`].

use converge_core::CoreError;
use thiserror::Error;

use crate::report::ToleranceFailure;

#[derive(Debug, Error)]
pub enum VerifyError {
    /// A numeric/analytic pair differed by at least the tolerance.
    #[error("{0}")]
    ToleranceExceeded(Box<ToleranceFailure>),

    /// A frozen layer emitted a delta for one of its own parameters.
    #[error("Frozen component listed in delta: layer '{layer}', param '{param}'")]
    FrozenComponentInDelta { layer: String, param: String },

    /// An unfrozen layer with state emitted no delta for any parameter.
    #[error("Nonfrozen component not listed in delta: layer '{layer}'")]
    NonfrozenComponentMissing { layer: String },

    /// No input received gradient although at least one was non-empty.
    #[error("Input gradient not propagated by layer '{layer}'")]
    InputNotPropagated { layer: String },

    /// A row of a batched evaluation disagreed with the single-row evaluation.
    #[error("Batch mismatch in {what} at batch size {batch_size}, row {row}: diff {diff:.3e}")]
    BatchMismatch {
        what: String,
        batch_size: usize,
        row: usize,
        diff: f64,
    },

    #[error("Core error: {0}")]
    Core(#[from] CoreError),

    #[error("Invalid verification config: {0}")]
    Config(#[from] serde_json::Error),
}
