//! Gradient comparison reports.

use converge_core::Tensor;
use std::fmt;

use crate::stats::{DoubleStatistics, ToleranceStatistics};

/// Numeric and analytic Jacobians for one input or parameter, each shaped
/// `[input_len, output_len]`.
///
/// Entry `(i, j)` is `∂output[j] / ∂input[i]`. Numeric entries that came out
/// NaN are kept in the matrices but excluded from every statistic.
#[derive(Debug, Clone, PartialEq)]
pub struct GradientReport {
    pub label: String,
    pub numeric: Tensor,
    pub analytic: Tensor,
    pub difference: Tensor,
    pub numeric_stats: DoubleStatistics,
    pub analytic_stats: DoubleStatistics,
    pub difference_stats: DoubleStatistics,
    pub tolerance: ToleranceStatistics,
    /// `(i, j)` of the largest absolute difference
    pub worst: Option<(usize, usize)>,
}

impl GradientReport {
    pub(crate) fn new(label: String, numeric: Tensor, analytic: Tensor) -> Self {
        let cols = numeric.dims().get(1).copied().unwrap_or(1).max(1);
        let difference = numeric.map(|_| 0.0);
        let mut report = Self {
            label,
            difference,
            numeric_stats: DoubleStatistics::new(),
            analytic_stats: DoubleStatistics::new(),
            difference_stats: DoubleStatistics::new(),
            tolerance: ToleranceStatistics::new(),
            worst: None,
            numeric,
            analytic,
        };

        let mut worst = f64::NEG_INFINITY;
        for k in 0..report.numeric.len() {
            let n = report.numeric.get(k);
            let a = report.analytic.get(k);
            report.difference.set(k, n - a);
            report.analytic_stats.accept(a);
            if n.is_nan() {
                continue;
            }
            report.numeric_stats.accept(n);
            report.difference_stats.accept(n - a);
            report.tolerance.accept(n, a);
            let diff = (n - a).abs();
            if diff > worst || diff.is_nan() {
                worst = diff;
                report.worst = Some((k / cols, k % cols));
            }
        }
        report
    }

    pub fn passes(&self, tolerance: f64) -> bool {
        self.tolerance.passes(tolerance)
    }

    fn entry(&self, matrix: &Tensor, at: (usize, usize)) -> f64 {
        let cols = matrix.dims().get(1).copied().unwrap_or(1).max(1);
        matrix.get(at.0 * cols + at.1)
    }
}

impl fmt::Display for GradientReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}: {}", self.label, self.tolerance)?;
        writeln!(f, "numeric  {}", self.numeric_stats)?;
        write!(f, "{}", self.numeric)?;
        writeln!(f, "analytic {}", self.analytic_stats)?;
        write!(f, "{}", self.analytic)?;
        writeln!(f, "error    {}", self.difference_stats)?;
        write!(f, "{}", self.difference)
    }
}

/// Payload of [`crate::VerifyError::ToleranceExceeded`].
#[derive(Debug, Clone, PartialEq)]
pub struct ToleranceFailure {
    pub report: GradientReport,
    pub tolerance: f64,
}

impl fmt::Display for ToleranceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = &self.report;
        match r.worst {
            Some(at) => write!(
                f,
                "Tolerance {:.1e} exceeded in {} at ({}, {}): numeric={:.6e}, analytic={:.6e}; {}",
                self.tolerance,
                r.label,
                at.0,
                at.1,
                r.entry(&r.numeric, at),
                r.entry(&r.analytic, at),
                r.tolerance
            ),
            None => write!(f, "Tolerance {:.1e} exceeded in {}", self.tolerance, r.label),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masks_nan_numeric_entries() {
        let numeric = Tensor::from_data(vec![2, 1], vec![f64::NAN, 1.0]).unwrap();
        let analytic = Tensor::from_data(vec![2, 1], vec![5.0, 1.0]).unwrap();
        let report = GradientReport::new("feedback[0]".into(), numeric, analytic);
        assert_eq!(report.tolerance.absolute.count(), 1);
        assert_eq!(report.analytic_stats.count(), 2);
        assert!(report.passes(1e-3));
    }

    #[test]
    fn test_worst_position() {
        let numeric = Tensor::from_data(vec![2, 2], vec![1.0, 0.0, 0.0, 1.0]).unwrap();
        let analytic = Tensor::from_data(vec![2, 2], vec![1.0, 0.0, 0.5, 1.0]).unwrap();
        let report = GradientReport::new("x".into(), numeric, analytic);
        assert_eq!(report.worst, Some((1, 0)));
        assert!(!report.passes(0.5));
    }
}
