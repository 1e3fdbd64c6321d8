//! # Line Search Cursors
//!
//! A cursor moves a trainable along a fixed direction and measures it:
//! `step(t)` places the weights at `origin + t · direction`. Line search
//! strategies only ever talk to a cursor, never to the trainable.
//!
//! [`FailsafeCursor`] wraps another cursor and remembers the best finite
//! point it has seen. Once the search is over, `finish` moves the trainable
//! back to that point, so a line search can never leave the weights worse
//! than the zero-length step.

use converge_core::DeltaSet;

use crate::error::OptimError;
use crate::monitor::TrainingMonitor;
use crate::orientation::LineSearchDirection;
use crate::sample::PointSample;
use crate::trainable::Trainable;

/// A measured point along the search line.
#[derive(Debug, Clone, PartialEq)]
pub struct LineSearchPoint {
    pub point: PointSample,
    /// Directional derivative `direction · gradient` at this point
    pub derivative: f64,
}

impl LineSearchPoint {
    /// Distance along the direction (`point.rate`).
    pub fn step(&self) -> f64 {
        self.point.rate
    }

    pub fn mean(&self) -> f64 {
        self.point.mean()
    }
}

/// Moves along a search direction and measures.
pub trait LineSearchCursor {
    /// Move to `origin + t · direction` and measure there.
    fn step(&mut self, t: f64, monitor: &mut dyn TrainingMonitor)
        -> Result<LineSearchPoint, OptimError>;

    /// Put the weights back to where `point` was measured.
    fn restore(&mut self, point: &PointSample) -> Result<(), OptimError>;

    /// Tag of the orientation that produced the direction.
    fn direction_type(&self) -> &str;
}

// ============================================================================
// Simple Cursor
// ============================================================================

/// Steps a trainable along a [`LineSearchDirection`].
pub struct SimpleCursor<'a> {
    trainable: &'a mut dyn Trainable,
    direction: LineSearchDirection,
}

impl<'a> SimpleCursor<'a> {
    pub fn new(trainable: &'a mut dyn Trainable, direction: LineSearchDirection) -> Self {
        Self {
            trainable,
            direction,
        }
    }

    pub fn direction(&self) -> &DeltaSet {
        &self.direction.direction
    }
}

impl LineSearchCursor for SimpleCursor<'_> {
    fn step(
        &mut self,
        t: f64,
        monitor: &mut dyn TrainingMonitor,
    ) -> Result<LineSearchPoint, OptimError> {
        let layer = self.trainable.layer_mut();
        self.direction.origin.weights.restore(layer)?;
        if t != 0.0 {
            self.direction.direction.apply(layer, t)?;
        }
        let point = self.trainable.measure(monitor)?.with_rate(t);
        let derivative = self.direction.direction.dot(&point.delta);
        Ok(LineSearchPoint { point, derivative })
    }

    fn restore(&mut self, point: &PointSample) -> Result<(), OptimError> {
        point.weights.restore(self.trainable.layer_mut())?;
        Ok(())
    }

    fn direction_type(&self) -> &str {
        &self.direction.direction_type
    }
}

// ============================================================================
// Failsafe Cursor
// ============================================================================

/// Tracks the best finite point any step has produced.
pub struct FailsafeCursor<C> {
    inner: C,
    best: Option<LineSearchPoint>,
}

impl<C: LineSearchCursor> FailsafeCursor<C> {
    pub fn new(inner: C) -> Self {
        Self { inner, best: None }
    }

    pub fn best(&self) -> Option<&LineSearchPoint> {
        self.best.as_ref()
    }

    /// Restore the best point seen and return it. If nothing was measured,
    /// measures the zero-length step.
    pub fn finish(
        mut self,
        monitor: &mut dyn TrainingMonitor,
    ) -> Result<LineSearchPoint, OptimError> {
        match self.best.take() {
            Some(best) => {
                self.inner.restore(&best.point)?;
                Ok(best)
            }
            None => self.inner.step(0.0, monitor),
        }
    }

    fn offer(&mut self, candidate: &LineSearchPoint) {
        let mean = candidate.mean();
        if !mean.is_finite() {
            return;
        }
        let better = match &self.best {
            Some(best) => mean < best.mean(),
            None => true,
        };
        if better {
            self.best = Some(candidate.clone());
        }
    }
}

impl<C: LineSearchCursor> LineSearchCursor for FailsafeCursor<C> {
    fn step(
        &mut self,
        t: f64,
        monitor: &mut dyn TrainingMonitor,
    ) -> Result<LineSearchPoint, OptimError> {
        let point = self.inner.step(t, monitor)?;
        self.offer(&point);
        Ok(point)
    }

    fn restore(&mut self, point: &PointSample) -> Result<(), OptimError> {
        self.inner.restore(point)
    }

    fn direction_type(&self) -> &str {
        self.inner.direction_type()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::NullMonitor;
    use converge_core::StateSet;

    /// A cursor over `f(t) = (t - 1)²` with `NaN` beyond `t = 3`.
    struct Parabola;

    impl LineSearchCursor for Parabola {
        fn step(
            &mut self,
            t: f64,
            _monitor: &mut dyn TrainingMonitor,
        ) -> Result<LineSearchPoint, OptimError> {
            let f = if t > 3.0 { f64::NAN } else { (t - 1.0).powi(2) };
            let point = PointSample::new(DeltaSet::new(), StateSet::default(), f, 1).with_rate(t);
            Ok(LineSearchPoint {
                point,
                derivative: 2.0 * (t - 1.0),
            })
        }

        fn restore(&mut self, _point: &PointSample) -> Result<(), OptimError> {
            Ok(())
        }

        fn direction_type(&self) -> &str {
            "test"
        }
    }

    #[test]
    fn test_failsafe_keeps_best() {
        let mut cursor = FailsafeCursor::new(Parabola);
        let mut monitor = NullMonitor;
        for t in [0.0, 2.5, 0.8, 1.5, 4.0] {
            cursor.step(t, &mut monitor).unwrap();
        }
        assert_eq!(cursor.best().unwrap().step(), 0.8);
        assert_eq!(cursor.direction_type(), "test");
        let best = cursor.finish(&mut monitor).unwrap();
        assert_eq!(best.step(), 0.8);
    }

    #[test]
    fn test_failsafe_ignores_nan() {
        let mut cursor = FailsafeCursor::new(Parabola);
        let mut monitor = NullMonitor;
        cursor.step(5.0, &mut monitor).unwrap();
        assert!(cursor.best().is_none());
        // Nothing finite seen: finish measures the origin.
        let best = cursor.finish(&mut monitor).unwrap();
        assert_eq!(best.step(), 0.0);
        assert_eq!(best.mean(), 1.0);
    }
}
