//! # Derivative Testing
//!
//! Cross-checks a layer's backward pass against forward-difference probes.
//!
//! ## Methodology
//!
//! For input `idx` (feedback) or parameter `k` (learning), and every output
//! coordinate `j`:
//!
//! - **Analytic column**: evaluate once, call the accumulator with a one-hot
//!   gradient at `j`, read the delta recorded for the input slot or the
//!   parameter slot.
//! - **Numeric column**: nudge element `i` by `+probe_size`, evaluate, and
//!   take `(f(x + h) - f(x)) / h` for every output coordinate.
//!
//! Both land in `[input_len, output_len]` matrices. The check passes when
//! every absolute difference is strictly below the tolerance.
//!
//! The frozen contract is checked alongside: a frozen copy must emit no
//! delta for its own parameters while still feeding its inputs, and an
//! unfrozen copy with parameters must emit at least one.

use converge_core::{CoreError, DeltaSet, Evaluation, Layer, SlotId, Tensor, TensorList};
use tracing::{debug, info, warn};

use crate::config::VerifyConfig;
use crate::error::VerifyError;
use crate::report::{GradientReport, ToleranceFailure};
use crate::stats::ToleranceStatistics;

/// Finite-difference verification of feedback and learning gradients.
#[derive(Debug, Clone, Default)]
pub struct DerivativeTester {
    config: VerifyConfig,
}

impl DerivativeTester {
    pub fn new(config: VerifyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &VerifyConfig {
        &self.config
    }

    /// Run every enabled check on `layer` at `prototypes` (one tensor per
    /// layer input) and return the combined statistics.
    pub fn test(
        &self,
        layer: &dyn Layer,
        prototypes: &[Tensor],
    ) -> Result<ToleranceStatistics, VerifyError> {
        let mut total = ToleranceStatistics::new();

        if self.config.test_feedback {
            for idx in 0..prototypes.len() {
                let report = self.feedback_report(layer, prototypes, idx)?;
                total = total.combine(&self.judge(report)?);
            }
        }

        if self.config.test_learning {
            for k in 0..layer.state().len() {
                let report = self.learning_report(layer, prototypes, k)?;
                total = total.combine(&self.judge(report)?);
            }
        }

        self.test_frozen(layer, prototypes)?;
        self.test_unfrozen(layer, prototypes)?;

        info!(layer = %layer.name(), stats = %total, "Derivative test passed");
        Ok(total)
    }

    /// Numeric and analytic Jacobians of the output with respect to input `idx`.
    pub fn feedback_report(
        &self,
        layer: &dyn Layer,
        prototypes: &[Tensor],
        idx: usize,
    ) -> Result<GradientReport, VerifyError> {
        let input_len = prototypes.get(idx).map(Tensor::len).unwrap_or(0);
        let baseline = forward(layer, prototypes)?;
        let output_len = baseline.len();

        // Analytic: one backward pass per output coordinate.
        let slot = SlotId::fresh();
        let inputs: Vec<Evaluation> = prototypes
            .iter()
            .enumerate()
            .map(|(k, p)| {
                let data = TensorList::single(p.clone());
                if k == idx {
                    Evaluation::slot(data, slot)
                } else {
                    Evaluation::constant(data)
                }
            })
            .collect();
        let output = layer.eval(&inputs)?;
        let mut analytic = vec![0.0; input_len * output_len];
        for j in 0..output_len {
            let deltas = backward_one_hot(&output, j)?;
            if let Some(delta) = deltas.get(slot) {
                for (i, v) in delta.values().iter().enumerate().take(input_len) {
                    analytic[i * output_len + j] = *v;
                }
            }
        }

        // Numeric: one forward pass per input element.
        let mut numeric = vec![0.0; input_len * output_len];
        let h = self.config.probe_size;
        for i in 0..input_len {
            let mut probed = prototypes.to_vec();
            let value = probed[idx].get(i);
            probed[idx].set(i, value + h);
            let moved = forward(layer, &probed)?;
            for j in 0..output_len {
                numeric[i * output_len + j] = (moved.get(j) - baseline.get(j)) / h;
            }
        }

        let label = format!("feedback[{idx}]");
        self.build_report(label, input_len, output_len, numeric, analytic)
    }

    /// Numeric and analytic Jacobians of the output with respect to the
    /// `k`-th parameter array, measured on an unfrozen copy of `layer`.
    pub fn learning_report(
        &self,
        layer: &dyn Layer,
        prototypes: &[Tensor],
        k: usize,
    ) -> Result<GradientReport, VerifyError> {
        let mut copy = layer.boxed_clone();
        copy.set_frozen(false);
        let (param_id, param_name, param_len) = match copy.state().get(k) {
            Some(p) => (p.id, p.name.clone(), p.len()),
            None => {
                return Err(CoreError::ValidationError {
                    reason: format!("layer '{}' has no parameter {k}", layer.name()),
                }
                .into())
            }
        };

        let baseline = forward(copy.as_ref(), prototypes)?;
        let output_len = baseline.len();

        let inputs = constants(prototypes);
        let output = copy.eval(&inputs)?;
        let mut analytic = vec![0.0; param_len * output_len];
        for j in 0..output_len {
            let deltas = backward_one_hot(&output, j)?;
            if let Some(delta) = deltas.get(param_id) {
                for (i, v) in delta.values().iter().enumerate().take(param_len) {
                    analytic[i * output_len + j] = *v;
                }
            }
        }

        let mut numeric = vec![0.0; param_len * output_len];
        let h = self.config.probe_size;
        for i in 0..param_len {
            let original = nudge(copy.as_mut(), k, i, h);
            let moved = forward(copy.as_ref(), prototypes);
            if let Some(value) = original {
                set_param(copy.as_mut(), k, i, value);
            }
            let moved = moved?;
            for j in 0..output_len {
                numeric[i * output_len + j] = (moved.get(j) - baseline.get(j)) / h;
            }
        }

        let label = format!("learning[{k}:{param_name}]");
        self.build_report(label, param_len, output_len, numeric, analytic)
    }

    /// A frozen copy must leave its own slots alone and still feed its inputs.
    pub fn test_frozen(&self, layer: &dyn Layer, prototypes: &[Tensor]) -> Result<(), VerifyError> {
        let mut copy = layer.boxed_clone();
        copy.freeze();

        let (slots, deltas) = backward_ones(copy.as_ref(), prototypes)?;
        for param in copy.state() {
            if deltas.contains(param.id) {
                return Err(VerifyError::FrozenComponentInDelta {
                    layer: layer.name().to_string(),
                    param: param.name.clone(),
                });
            }
        }

        let any_input = prototypes.iter().any(|p| !p.is_empty());
        if any_input && !slots.iter().any(|s| deltas.contains(*s)) {
            return Err(VerifyError::InputNotPropagated {
                layer: layer.name().to_string(),
            });
        }
        Ok(())
    }

    /// An unfrozen copy with parameters must emit at least one of them.
    pub fn test_unfrozen(
        &self,
        layer: &dyn Layer,
        prototypes: &[Tensor],
    ) -> Result<(), VerifyError> {
        let mut copy = layer.boxed_clone();
        copy.set_frozen(false);
        if copy.state().is_empty() {
            return Ok(());
        }

        let (_, deltas) = backward_ones(copy.as_ref(), prototypes)?;
        if !copy.state().iter().any(|p| deltas.contains(p.id)) {
            return Err(VerifyError::NonfrozenComponentMissing {
                layer: layer.name().to_string(),
            });
        }
        Ok(())
    }

    fn build_report(
        &self,
        label: String,
        rows: usize,
        cols: usize,
        numeric: Vec<f64>,
        analytic: Vec<f64>,
    ) -> Result<GradientReport, VerifyError> {
        let numeric = Tensor::from_data(vec![rows, cols], numeric)?;
        let analytic = Tensor::from_data(vec![rows, cols], analytic)?;
        Ok(GradientReport::new(label, numeric, analytic))
    }

    /// Log the report and turn a failing one into an error when `verify` is on.
    fn judge(&self, report: GradientReport) -> Result<ToleranceStatistics, VerifyError> {
        if self.config.verbose {
            debug!("\n{report}");
        }
        let stats = report.tolerance;
        if report.passes(self.config.tolerance) {
            debug!(label = %report.label, stats = %stats, "Gradient within tolerance");
            return Ok(stats);
        }

        warn!(label = %report.label, stats = %stats, "Gradient outside tolerance");
        if self.config.verify {
            return Err(VerifyError::ToleranceExceeded(Box::new(ToleranceFailure {
                report,
                tolerance: self.config.tolerance,
            })));
        }
        Ok(stats)
    }
}

fn constants(prototypes: &[Tensor]) -> Vec<Evaluation> {
    prototypes
        .iter()
        .map(|p| Evaluation::constant(TensorList::single(p.clone())))
        .collect()
}

/// Flattened output of a single-row forward pass.
fn forward(layer: &dyn Layer, prototypes: &[Tensor]) -> Result<Tensor, VerifyError> {
    let output = layer.eval(&constants(prototypes))?;
    let data: Vec<f64> = output
        .data()
        .iter()
        .flat_map(|t| t.data().iter().copied())
        .collect();
    Ok(Tensor::vector(data))
}

fn backward_one_hot(output: &Evaluation, j: usize) -> Result<DeltaSet, VerifyError> {
    let shape = output.data().item_shape();
    let gradient = TensorList::single(Tensor::one_hot(shape, j));
    let mut deltas = DeltaSet::new();
    output.accumulate(&mut deltas, &gradient)?;
    Ok(deltas)
}

/// Evaluate with every input on its own slot and push a gradient of ones.
fn backward_ones(
    layer: &dyn Layer,
    prototypes: &[Tensor],
) -> Result<(Vec<SlotId>, DeltaSet), VerifyError> {
    let slots: Vec<SlotId> = prototypes.iter().map(|_| SlotId::fresh()).collect();
    let inputs: Vec<Evaluation> = prototypes
        .iter()
        .zip(&slots)
        .map(|(p, s)| Evaluation::slot(TensorList::single(p.clone()), *s))
        .collect();
    let output = layer.eval(&inputs)?;
    let mut deltas = DeltaSet::new();
    output.accumulate(&mut deltas, &output.data().ones_like())?;
    Ok((slots, deltas))
}

/// Add `h` to scalar `i` of parameter `k`, returning the previous value.
fn nudge(layer: &mut dyn Layer, k: usize, i: usize, h: f64) -> Option<f64> {
    let param = layer.state_mut().into_iter().nth(k)?;
    let previous = param.value.get(i);
    param.value.set(i, previous + h);
    Some(previous)
}

fn set_param(layer: &mut dyn Layer, k: usize, i: usize, value: f64) {
    if let Some(param) = layer.state_mut().into_iter().nth(k) {
        param.value.set(i, value);
    }
}
