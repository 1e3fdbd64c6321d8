//! # Line Search Strategies
//!
//! Each strategy walks a [`LineSearchCursor`] along one direction and
//! returns the point it settles on. Strategies are stateful: they remember
//! the step length that worked last time and start from it on the next
//! call, which is why the trainer keeps one instance per direction tag.
//!
//! Every search begins by measuring the zero-length step. Run through a
//! [`crate::FailsafeCursor`], that point bounds the result from above.

use tracing::debug;

use crate::cursor::{LineSearchCursor, LineSearchPoint};
use crate::error::OptimError;
use crate::monitor::TrainingMonitor;

/// Step-length strategy.
#[derive(Debug, Clone, PartialEq)]
pub enum LineSearch {
    ArmijoWolfe(ArmijoWolfe),
    Quadratic(QuadraticSearch),
    StaticRate(StaticRate),
}

impl Default for LineSearch {
    fn default() -> Self {
        LineSearch::ArmijoWolfe(ArmijoWolfe::default())
    }
}

impl LineSearch {
    pub fn step(
        &mut self,
        cursor: &mut dyn LineSearchCursor,
        monitor: &mut dyn TrainingMonitor,
    ) -> Result<LineSearchPoint, OptimError> {
        match self {
            LineSearch::ArmijoWolfe(search) => search.step(cursor, monitor),
            LineSearch::Quadratic(search) => search.step(cursor, monitor),
            LineSearch::StaticRate(search) => search.step(cursor, monitor),
        }
    }
}

// ============================================================================
// Armijo-Wolfe
// ============================================================================

/// Bracketing search for a step satisfying the weak Wolfe conditions:
///
/// - sufficient decrease: `f(α) ≤ f(0) + c1 · α · f'(0)`
/// - curvature: `f'(α) ≥ c2 · f'(0)`
///
/// Steps that violate the first condition shrink the bracket from above,
/// steps that violate the second push it up from below. With no upper
/// bound yet the step grows geometrically.
#[derive(Debug, Clone, PartialEq)]
pub struct ArmijoWolfe {
    pub c1: f64,
    pub c2: f64,
    /// Initial step for the next search
    pub alpha: f64,
    pub growth: f64,
    pub min_alpha: f64,
    pub max_iterations: usize,
}

impl Default for ArmijoWolfe {
    fn default() -> Self {
        Self {
            c1: 1e-6,
            c2: 0.9,
            alpha: 1.0,
            growth: 2.0,
            min_alpha: 1e-15,
            max_iterations: 50,
        }
    }
}

impl ArmijoWolfe {
    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_conditions(mut self, c1: f64, c2: f64) -> Self {
        self.c1 = c1;
        self.c2 = c2;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn step(
        &mut self,
        cursor: &mut dyn LineSearchCursor,
        monitor: &mut dyn TrainingMonitor,
    ) -> Result<LineSearchPoint, OptimError> {
        let start = cursor.step(0.0, monitor)?;
        let f0 = start.mean();
        let d0 = start.derivative;
        if !(d0 < 0.0) {
            monitor.log(&format!(
                "{}: not a descent direction (slope {d0:e})",
                cursor.direction_type()
            ));
            return Ok(start);
        }

        let mut alpha = self.alpha.max(self.min_alpha);
        let mut low = 0.0;
        let mut high = f64::INFINITY;
        let mut best_low: Option<LineSearchPoint> = None;

        for _ in 0..self.max_iterations {
            let point = cursor.step(alpha, monitor)?;
            let f = point.mean();
            if !f.is_finite() || f > f0 + self.c1 * alpha * d0 {
                high = alpha;
            } else if point.derivative < self.c2 * d0 {
                low = alpha;
                best_low = Some(point);
            } else {
                debug!(alpha, mean = f, "Wolfe conditions satisfied");
                self.alpha = alpha;
                return Ok(point);
            }

            alpha = if high.is_finite() {
                (low + high) / 2.0
            } else {
                alpha * self.growth
            };
            if high - low < self.min_alpha {
                break;
            }
        }

        if let Some(point) = best_low {
            self.alpha = point.step();
            return Ok(point);
        }
        monitor.log(&format!(
            "{}: no acceptable step down to {alpha:e}",
            cursor.direction_type()
        ));
        self.alpha = alpha.max(self.min_alpha);
        Ok(start)
    }
}

// ============================================================================
// Quadratic
// ============================================================================

/// Fits a parabola through `f(0)`, `f'(0)` and `f(t)` and jumps to its
/// minimum. Halves the trial step while it fails to improve.
#[derive(Debug, Clone, PartialEq)]
pub struct QuadraticSearch {
    /// Initial trial step for the next search
    pub rate: f64,
    pub min_rate: f64,
    pub max_iterations: usize,
}

impl Default for QuadraticSearch {
    fn default() -> Self {
        Self {
            rate: 1.0,
            min_rate: 1e-12,
            max_iterations: 30,
        }
    }
}

impl QuadraticSearch {
    pub fn with_rate(mut self, rate: f64) -> Self {
        self.rate = rate;
        self
    }

    /// Minimizer of the parabola through `(0, f0)` with slope `d0` and `(t, ft)`.
    fn vertex(f0: f64, d0: f64, t: f64, ft: f64) -> Option<f64> {
        let curvature = ft - f0 - d0 * t;
        if !(curvature > 0.0) {
            return None;
        }
        let vertex = -d0 * t * t / (2.0 * curvature);
        (vertex.is_finite() && vertex > 0.0).then_some(vertex)
    }

    pub fn step(
        &mut self,
        cursor: &mut dyn LineSearchCursor,
        monitor: &mut dyn TrainingMonitor,
    ) -> Result<LineSearchPoint, OptimError> {
        let start = cursor.step(0.0, monitor)?;
        let f0 = start.mean();
        let d0 = start.derivative;
        if !(d0 < 0.0) {
            return Ok(start);
        }

        let mut t = self.rate;
        for _ in 0..self.max_iterations {
            if t < self.min_rate {
                break;
            }
            let trial = cursor.step(t, monitor)?;
            let ft = trial.mean();
            let vertex = if ft.is_finite() {
                Self::vertex(f0, d0, t, ft)
            } else {
                None
            };

            if ft < f0 {
                if let Some(v) = vertex.filter(|&v| v != t) {
                    let refined = cursor.step(v, monitor)?;
                    if refined.mean() < ft {
                        self.rate = v;
                        return Ok(refined);
                    }
                }
                self.rate = t;
                return Ok(trial);
            }

            // Overshot: the vertex lies inside (0, t); keep it away from both ends.
            t = match vertex {
                Some(v) => v.clamp(0.1 * t, 0.5 * t),
                None => 0.5 * t,
            };
        }

        monitor.log(&format!(
            "{}: quadratic search found no improvement",
            cursor.direction_type()
        ));
        self.rate = t.max(self.min_rate);
        Ok(start)
    }
}

// ============================================================================
// Static Rate
// ============================================================================

/// A fixed step, halved while it fails to improve.
#[derive(Debug, Clone, PartialEq)]
pub struct StaticRate {
    pub rate: f64,
    pub min_rate: f64,
}

impl Default for StaticRate {
    fn default() -> Self {
        Self {
            rate: 1e-4,
            min_rate: 1e-12,
        }
    }
}

impl StaticRate {
    pub fn new(rate: f64) -> Self {
        Self {
            rate,
            ..Self::default()
        }
    }

    pub fn with_min_rate(mut self, min_rate: f64) -> Self {
        self.min_rate = min_rate;
        self
    }

    pub fn step(
        &mut self,
        cursor: &mut dyn LineSearchCursor,
        monitor: &mut dyn TrainingMonitor,
    ) -> Result<LineSearchPoint, OptimError> {
        let start = cursor.step(0.0, monitor)?;
        let f0 = start.mean();
        let mut rate = self.rate;
        while rate >= self.min_rate {
            let point = cursor.step(rate, monitor)?;
            if point.mean() < f0 {
                return Ok(point);
            }
            rate /= 2.0;
        }
        monitor.log(&format!(
            "{}: static rate fell below {:e}",
            cursor.direction_type(),
            self.min_rate
        ));
        Ok(start)
    }
}
