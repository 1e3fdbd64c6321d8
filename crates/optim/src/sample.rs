//! Measured points on the loss surface.

use converge_core::{DeltaSet, StateSet};
use std::time::Duration;

/// Loss and gradient at one weight configuration.
///
/// `delta` is the gradient of the *mean* loss. Samples are never mutated
/// once built; the `with_*` methods return new ones.
#[derive(Debug, Clone, PartialEq)]
pub struct PointSample {
    pub delta: DeltaSet,
    pub weights: StateSet,
    pub sum: f64,
    pub count: usize,
    /// Step length along the search direction that produced this point
    pub rate: f64,
}

impl PointSample {
    pub fn new(delta: DeltaSet, weights: StateSet, sum: f64, count: usize) -> Self {
        Self {
            delta,
            weights,
            sum,
            count,
            rate: 0.0,
        }
    }

    /// Mean loss over the rows that were measured.
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            return f64::NAN;
        }
        self.sum / self.count as f64
    }

    pub fn is_finite(&self) -> bool {
        self.mean().is_finite()
    }

    pub fn with_rate(&self, rate: f64) -> PointSample {
        PointSample {
            rate,
            ..self.clone()
        }
    }
}

/// A record handed to the monitor on step completion or failure.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub point: PointSample,
    pub iteration: usize,
    pub time: Duration,
}

impl Step {
    pub fn new(point: PointSample, iteration: usize, time: Duration) -> Self {
        Self {
            point,
            iteration,
            time,
        }
    }

    pub fn mean(&self) -> f64 {
        self.point.mean()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean() {
        let p = PointSample::new(DeltaSet::new(), StateSet::default(), 3.0, 2);
        assert_eq!(p.mean(), 1.5);
        assert!(p.is_finite());
        assert!(!PointSample::new(DeltaSet::new(), StateSet::default(), 0.0, 0).is_finite());
    }

    #[test]
    fn test_with_rate_leaves_original() {
        let p = PointSample::new(DeltaSet::new(), StateSet::default(), 1.0, 1);
        let q = p.with_rate(0.5);
        assert_eq!(p.rate, 0.0);
        assert_eq!(q.rate, 0.5);
        assert_eq!(q.mean(), p.mean());
    }
}
