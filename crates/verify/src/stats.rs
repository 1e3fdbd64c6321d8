//! # Running Statistics
//!
//! Streaming summaries used for gradient comparisons and timing reports.
//! Both types are monoids with `Default` as the identity. `combine` is
//! exactly associative in `count`, `min` and `max`; `sum` and `sum_sq` are
//! floating-point sums, associative up to rounding.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Floor for the denominator of a relative difference.
pub const RELATIVE_EPSILON: f64 = 1e-12;

/// Count, sum, sum of squares, min and max of a stream of doubles.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DoubleStatistics {
    count: usize,
    sum: f64,
    sum_sq: f64,
    min: f64,
    max: f64,
}

impl Default for DoubleStatistics {
    fn default() -> Self {
        Self {
            count: 0,
            sum: 0.0,
            sum_sq: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }
}

impl DoubleStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Summary of every value yielded by `values`.
    pub fn of(values: impl IntoIterator<Item = f64>) -> Self {
        let mut stats = Self::new();
        for v in values {
            stats.accept(v);
        }
        stats
    }

    pub fn accept(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        self.sum_sq += value * value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    pub fn combine(&self, other: &DoubleStatistics) -> DoubleStatistics {
        DoubleStatistics {
            count: self.count + other.count,
            sum: self.sum + other.sum,
            sum_sq: self.sum_sq + other.sum_sq,
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    pub fn sum_sq(&self) -> f64 {
        self.sum_sq
    }

    /// Smallest value, `+inf` when empty.
    pub fn min(&self) -> f64 {
        self.min
    }

    /// Largest value, `-inf` when empty.
    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.sum / self.count as f64
    }

    /// Population standard deviation.
    pub fn stddev(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let mean = self.mean();
        (self.sum_sq / self.count as f64 - mean * mean).max(0.0).sqrt()
    }
}

impl fmt::Display for DoubleStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.count == 0 {
            return write!(f, "(empty)");
        }
        write!(
            f,
            "{:.3e} ± {:.3e} [{:.3e} - {:.3e}] ({} samples)",
            self.mean(),
            self.stddev(),
            self.min,
            self.max,
            self.count
        )
    }
}

/// Absolute and relative differences between numeric and analytic values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ToleranceStatistics {
    pub absolute: DoubleStatistics,
    pub relative: DoubleStatistics,
}

impl ToleranceStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one `(numeric, analytic)` pair. A NaN difference counts as infinite.
    pub fn accept(&mut self, numeric: f64, analytic: f64) {
        let diff = (numeric - analytic).abs();
        let diff = if diff.is_nan() { f64::INFINITY } else { diff };
        let scale = numeric.abs().max(analytic.abs()).max(RELATIVE_EPSILON);
        self.absolute.accept(diff);
        self.relative.accept(diff / scale);
    }

    pub fn combine(&self, other: &ToleranceStatistics) -> ToleranceStatistics {
        ToleranceStatistics {
            absolute: self.absolute.combine(&other.absolute),
            relative: self.relative.combine(&other.relative),
        }
    }

    /// True when every absolute difference is below `tolerance`.
    pub fn passes(&self, tolerance: f64) -> bool {
        self.absolute.count() == 0 || self.absolute.max() < tolerance
    }
}

impl fmt::Display for ToleranceStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "abs {} / rel {}", self.absolute, self.relative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_mean_and_stddev() {
        let stats = DoubleStatistics::of([1.0, 2.0, 3.0, 4.0]);
        assert_eq!(stats.count(), 4);
        assert_abs_diff_eq!(stats.mean(), 2.5);
        assert_abs_diff_eq!(stats.stddev(), 1.25f64.sqrt(), epsilon = 1e-12);
        assert_eq!(stats.min(), 1.0);
        assert_eq!(stats.max(), 4.0);
    }

    #[test]
    fn test_empty_is_identity() {
        let a = DoubleStatistics::of([0.5, -0.25]);
        assert_eq!(a.combine(&DoubleStatistics::new()), a);
        assert_eq!(DoubleStatistics::new().combine(&a), a);
        assert_eq!(DoubleStatistics::new().mean(), 0.0);
    }

    #[test]
    fn test_combine_is_associative_up_to_rounding() {
        let mut rng = StdRng::seed_from_u64(17);
        for _ in 0..20 {
            let mut part = |n: usize| {
                DoubleStatistics::of((0..n).map(|_| rng.gen_range(-1e3..1e3)).collect::<Vec<f64>>())
            };
            let (a, b, c) = (part(3), part(5), part(7));
            let left = a.combine(&b).combine(&c);
            let right = a.combine(&b.combine(&c));
            assert_eq!(left.count(), right.count());
            assert_eq!(left.min(), right.min());
            assert_eq!(left.max(), right.max());
            assert_relative_eq!(left.mean(), right.mean(), max_relative = 1e-12, epsilon = 1e-12);
            assert_relative_eq!(left.stddev(), right.stddev(), max_relative = 1e-9);
        }
    }

    #[test]
    fn test_combine_is_exact_on_dyadic_values() {
        let a = DoubleStatistics::of([0.5, 0.25]);
        let b = DoubleStatistics::of([1.5]);
        let c = DoubleStatistics::of([-2.0, 0.125, 4.0]);
        assert_eq!(a.combine(&b).combine(&c), a.combine(&b.combine(&c)));

        let mut x = ToleranceStatistics::new();
        x.accept(1.0, 0.5);
        let mut y = ToleranceStatistics::new();
        y.accept(0.25, 0.25);
        let mut z = ToleranceStatistics::new();
        z.accept(-1.0, 1.0);
        assert_eq!(x.combine(&y).combine(&z), x.combine(&y.combine(&z)));
    }

    #[test]
    fn test_relative_difference() {
        let mut stats = ToleranceStatistics::new();
        stats.accept(2.0, 1.0);
        assert_eq!(stats.absolute.max(), 1.0);
        assert_eq!(stats.relative.max(), 0.5);

        let mut zeros = ToleranceStatistics::new();
        zeros.accept(0.0, 0.0);
        assert_eq!(zeros.relative.max(), 0.0);
    }

    #[test]
    fn test_passes_is_strict() {
        let mut stats = ToleranceStatistics::new();
        stats.accept(1.0, 0.5);
        assert!(stats.passes(0.6));
        assert!(!stats.passes(0.5));
        assert!(ToleranceStatistics::new().passes(1e-9));
    }
}
