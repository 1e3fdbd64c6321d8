//! # Orientation Strategies
//!
//! Given the current [`PointSample`], an orientation picks the direction
//! the line search walks along. Every direction carries a tag; the trainer
//! keeps one line search per tag so that, for example, the step length
//! learned for quasi-Newton directions is not reused for raw gradients.
//!
//! ## Strategies
//!
//! | Strategy | Direction | Tag |
//! |----------|-----------|-----|
//! | [`Orientation::GradientDescent`] | `-g` | `GD` |
//! | [`Orientation::Lbfgs`] | `-H·g` from the two-loop recursion | `LBFGS` |
//! | [`Orientation::Momentum`] | `-g + decay · previous` | `Momentum` |
//!
//! L-BFGS and momentum fall back to `-g` (tagged `GD`) whenever their own
//! direction is unavailable or fails to descend.

use std::collections::VecDeque;

use converge_core::DeltaSet;
use tracing::debug;

use crate::error::OptimError;
use crate::monitor::TrainingMonitor;
use crate::sample::PointSample;

pub const GRADIENT_DESCENT: &str = "GD";
pub const LBFGS: &str = "LBFGS";
pub const MOMENTUM: &str = "Momentum";

/// A direction to search along, anchored at the point it was computed for.
#[derive(Debug, Clone, PartialEq)]
pub struct LineSearchDirection {
    pub origin: PointSample,
    pub direction: DeltaSet,
    pub direction_type: String,
}

impl LineSearchDirection {
    /// Steepest descent from `origin`.
    pub fn steepest(origin: &PointSample) -> Self {
        Self {
            direction: origin.delta.scale(-1.0),
            origin: origin.clone(),
            direction_type: GRADIENT_DESCENT.to_string(),
        }
    }

    /// Directional derivative at the origin.
    pub fn slope(&self) -> f64 {
        self.direction.dot(&self.origin.delta)
    }
}

// ============================================================================
// L-BFGS
// ============================================================================

/// One curvature pair `(s, y, 1 / s·y)`.
#[derive(Debug, Clone, PartialEq)]
struct CurvaturePair {
    s: DeltaSet,
    y: DeltaSet,
    rho: f64,
}

/// History for the limited-memory BFGS approximation.
#[derive(Debug, Clone, PartialEq)]
pub struct LbfgsState {
    history: VecDeque<CurvaturePair>,
    last: Option<PointSample>,
    /// Pairs needed before quasi-Newton directions are used
    pub min_history: usize,
    /// Oldest pairs are dropped beyond this
    pub max_history: usize,
}

impl Default for LbfgsState {
    fn default() -> Self {
        Self {
            history: VecDeque::new(),
            last: None,
            min_history: 3,
            max_history: 30,
        }
    }
}

impl LbfgsState {
    pub fn with_history(mut self, min_history: usize, max_history: usize) -> Self {
        self.min_history = min_history;
        self.max_history = max_history.max(1);
        self
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    fn reset(&mut self) {
        self.history.clear();
        self.last = None;
    }

    /// Record the pair between the previous point and `point`. Pairs
    /// without positive curvature are skipped.
    fn observe(&mut self, point: &PointSample) -> Result<(), OptimError> {
        if let Some(last) = &self.last {
            let mut s = point.weights.subtract(&last.weights);
            let frozen: Vec<_> = s.keys().filter(|k| !point.delta.contains(*k)).collect();
            for key in frozen {
                s.remove(key);
            }
            let y = point.delta.subtract(&last.delta)?;
            let sy = s.dot(&y);
            if sy > 0.0 && sy.is_finite() {
                self.history.push_back(CurvaturePair { s, y, rho: 1.0 / sy });
                while self.history.len() > self.max_history {
                    self.history.pop_front();
                }
            } else {
                debug!(sy, "Skipping curvature pair");
            }
        }
        self.last = Some(point.clone());
        Ok(())
    }

    /// Two-loop recursion: `-H·g`.
    fn direction(&self, gradient: &DeltaSet) -> Result<Option<DeltaSet>, OptimError> {
        let Some(newest) = self.history.back() else {
            return Ok(None);
        };
        let mut q = gradient.clone();
        let mut alphas = Vec::with_capacity(self.history.len());
        for pair in self.history.iter().rev() {
            let alpha = pair.rho * pair.s.dot(&q);
            q = q.add_scaled(&pair.y, -alpha)?;
            alphas.push(alpha);
        }

        let gamma = newest.s.dot(&newest.y) / newest.y.dot(&newest.y);
        let mut r = q.scale(gamma);
        for (pair, alpha) in self.history.iter().zip(alphas.iter().rev()) {
            let beta = pair.rho * pair.y.dot(&r);
            r = r.add_scaled(&pair.s, alpha - beta)?;
        }
        Ok(Some(r.scale(-1.0)))
    }
}

// ============================================================================
// Momentum
// ============================================================================

/// Heavy-ball state: a fraction of the previous direction is carried over.
#[derive(Debug, Clone, PartialEq)]
pub struct MomentumState {
    pub decay: f64,
    previous: Option<DeltaSet>,
}

impl MomentumState {
    pub fn new(decay: f64) -> Self {
        Self {
            decay,
            previous: None,
        }
    }
}

impl Default for MomentumState {
    fn default() -> Self {
        Self::new(0.9)
    }
}

// ============================================================================
// Orientation
// ============================================================================

/// Direction-picking strategy.
#[derive(Debug, Clone, PartialEq)]
pub enum Orientation {
    GradientDescent,
    Lbfgs(LbfgsState),
    Momentum(MomentumState),
}

impl Orientation {
    pub fn lbfgs() -> Self {
        Orientation::Lbfgs(LbfgsState::default())
    }

    pub fn momentum(decay: f64) -> Self {
        Orientation::Momentum(MomentumState::new(decay))
    }

    /// Tag of the strategy's own (non-fallback) directions.
    pub fn tag(&self) -> &'static str {
        match self {
            Orientation::GradientDescent => GRADIENT_DESCENT,
            Orientation::Lbfgs(_) => LBFGS,
            Orientation::Momentum(_) => MOMENTUM,
        }
    }

    /// Forget all history. Called whenever the loss surface changes.
    pub fn reset(&mut self) {
        match self {
            Orientation::GradientDescent => {}
            Orientation::Lbfgs(state) => state.reset(),
            Orientation::Momentum(state) => state.previous = None,
        }
    }

    /// Pick a search direction at `point`.
    pub fn orient(
        &mut self,
        point: &PointSample,
        monitor: &mut dyn TrainingMonitor,
    ) -> Result<LineSearchDirection, OptimError> {
        let gradient = &point.delta;
        match self {
            Orientation::GradientDescent => Ok(LineSearchDirection::steepest(point)),
            Orientation::Lbfgs(state) => {
                state.observe(point)?;
                if state.history.len() < state.min_history {
                    return Ok(LineSearchDirection::steepest(point));
                }
                match state.direction(gradient)? {
                    Some(d) if d.is_finite() && d.dot(gradient) < 0.0 => Ok(LineSearchDirection {
                        origin: point.clone(),
                        direction: d,
                        direction_type: LBFGS.to_string(),
                    }),
                    _ => {
                        monitor.log("LBFGS direction does not descend; using steepest descent");
                        state.reset();
                        state.last = Some(point.clone());
                        Ok(LineSearchDirection::steepest(point))
                    }
                }
            }
            Orientation::Momentum(state) => {
                let steepest = gradient.scale(-1.0);
                let direction = match &state.previous {
                    Some(previous) => steepest.add_scaled(previous, state.decay)?,
                    None => steepest,
                };
                if direction.is_finite() && direction.dot(gradient) < 0.0 {
                    state.previous = Some(direction.clone());
                    Ok(LineSearchDirection {
                        origin: point.clone(),
                        direction,
                        direction_type: MOMENTUM.to_string(),
                    })
                } else {
                    monitor.log("Momentum direction does not descend; restarting");
                    let fallback = LineSearchDirection::steepest(point);
                    state.previous = Some(fallback.direction.clone());
                    Ok(fallback)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::NullMonitor;
    use approx::assert_abs_diff_eq;
    use converge_core::{Layer, LayerHeader, Param, SlotId, StateSet, Tensor};

    /// Holds one parameter so weight snapshots can be taken.
    #[derive(Debug, Clone)]
    struct Holder {
        header: LayerHeader,
        w: Param,
    }

    impl Layer for Holder {
        fn header(&self) -> &LayerHeader {
            &self.header
        }

        fn header_mut(&mut self) -> &mut LayerHeader {
            &mut self.header
        }

        fn state(&self) -> Vec<&Param> {
            vec![&self.w]
        }

        fn state_mut(&mut self) -> Vec<&mut Param> {
            vec![&mut self.w]
        }

        fn eval(
            &self,
            _inputs: &[converge_core::Evaluation],
        ) -> Result<converge_core::Evaluation, converge_core::CoreError> {
            Err(converge_core::CoreError::ValidationError {
                reason: "not evaluable".into(),
            })
        }

        fn boxed_clone(&self) -> Box<dyn Layer> {
            Box::new(self.clone())
        }
    }

    /// A point on `f(w) = ½ wᵀ diag(a) w`.
    fn quadratic_point(holder: &mut Holder, a: &[f64], w: &[f64]) -> PointSample {
        holder.w.value = Tensor::vector(w.to_vec());
        let mut delta = DeltaSet::new();
        let g: Vec<f64> = a.iter().zip(w).map(|(a, w)| a * w).collect();
        delta.accumulate(holder.w.id, &g).unwrap();
        let f: f64 = a.iter().zip(w).map(|(a, w)| 0.5 * a * w * w).sum();
        PointSample::new(delta, StateSet::capture(&*holder), f, 1)
    }

    fn holder() -> Holder {
        Holder {
            header: LayerHeader::new("holder"),
            w: Param::new("w", Tensor::vector(vec![0.0, 0.0])),
        }
    }

    fn gradient(slot: SlotId, values: &[f64]) -> PointSample {
        let mut delta = DeltaSet::new();
        delta.accumulate(slot, values).unwrap();
        PointSample::new(delta, StateSet::default(), 1.0, 1)
    }

    #[test]
    fn test_gradient_descent_negates() {
        let slot = SlotId::fresh();
        let mut orientation = Orientation::GradientDescent;
        let d = orientation
            .orient(&gradient(slot, &[1.0, -2.0]), &mut NullMonitor)
            .unwrap();
        assert_eq!(d.direction_type, "GD");
        assert_eq!(d.direction.get(slot).unwrap().values(), &[-1.0, 2.0]);
        assert_eq!(d.slope(), -5.0);
    }

    #[test]
    fn test_lbfgs_falls_back_until_history_fills() {
        let mut h = holder();
        let a = [1.0, 10.0];
        let mut orientation = Orientation::lbfgs();
        let d = orientation
            .orient(&quadratic_point(&mut h, &a, &[1.0, 1.0]), &mut NullMonitor)
            .unwrap();
        assert_eq!(d.direction_type, "GD");
        if let Orientation::Lbfgs(state) = &orientation {
            assert_eq!(state.history_len(), 0);
        }
    }

    #[test]
    fn test_lbfgs_recovers_newton_on_quadratic() {
        let mut h = holder();
        let slot = h.w.id;
        let a = [1.0, 10.0];
        let mut orientation = Orientation::Lbfgs(LbfgsState::default().with_history(2, 30));
        let points = [[2.0, 1.0], [1.0, 1.0], [1.0, 0.5]];
        let mut last = None;
        for w in points {
            let p = quadratic_point(&mut h, &a, &w);
            last = Some(orientation.orient(&p, &mut NullMonitor).unwrap());
        }
        let d = last.unwrap();
        assert_eq!(d.direction_type, "LBFGS");
        // The two steps are conjugate under diag(a), so the inverse Hessian
        // is exact and the direction is the Newton step back to zero.
        let values = d.direction.get(slot).unwrap().values();
        assert_abs_diff_eq!(values[0], -1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(values[1], -0.5, epsilon = 1e-9);
    }

    #[test]
    fn test_momentum_accumulates_and_resets() {
        let slot = SlotId::fresh();
        let mut orientation = Orientation::momentum(0.5);
        let p = gradient(slot, &[1.0]);
        orientation.orient(&p, &mut NullMonitor).unwrap();
        let d = orientation.orient(&p, &mut NullMonitor).unwrap();
        assert_eq!(d.direction_type, "Momentum");
        assert_eq!(d.direction.get(slot).unwrap().values(), &[-1.5]);

        orientation.reset();
        let d = orientation.orient(&p, &mut NullMonitor).unwrap();
        assert_eq!(d.direction.get(slot).unwrap().values(), &[-1.0]);
    }
}
