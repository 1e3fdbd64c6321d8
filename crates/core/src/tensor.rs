//! # Tensors
//!
//! A dense, fixed-shape array of `f64` with an owned backing buffer.
//!
//! ```rust
//! use converge_core::Tensor;
//!
//! let a = Tensor::vector(vec![1.0, 2.0, 3.0]);
//! let b = Tensor::vector(vec![0.5, 0.5, 0.5]);
//! let c = a.add(&b).unwrap();
//! assert_eq!(c.data(), &[1.5, 2.5, 3.5]);
//! ```
//!
//! Copies are deep. Arithmetic always allocates a fresh buffer for the
//! result, so an operand is never aliased by what an operation returns.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;
use crate::shape::Shape;

/// A dense tensor of doubles in row-major order.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    shape: Shape,
    data: Vec<f64>,
}

impl Tensor {
    /// A tensor filled with zeros.
    pub fn zeros(shape: impl Into<Shape>) -> Self {
        Self::full(shape, 0.0)
    }

    /// A tensor filled with a constant.
    pub fn full(shape: impl Into<Shape>, value: f64) -> Self {
        let shape = shape.into();
        let data = vec![value; shape.numel()];
        Self { shape, data }
    }

    /// Build a tensor from a buffer, checking that it fits the shape.
    pub fn from_data(shape: impl Into<Shape>, data: Vec<f64>) -> Result<Self, CoreError> {
        let shape = shape.into();
        if data.len() != shape.numel() {
            return Err(CoreError::ElementCountMismatch {
                expected: shape.numel(),
                got: data.len(),
                shape,
            });
        }
        Ok(Self { shape, data })
    }

    /// A rank-1 tensor over the given values.
    pub fn vector(data: Vec<f64>) -> Self {
        Self {
            shape: Shape::vector(data.len()),
            data,
        }
    }

    /// A scalar tensor.
    pub fn scalar(value: f64) -> Self {
        Self {
            shape: Shape::scalar(),
            data: vec![value],
        }
    }

    /// All zeros except a single 1.0 at flat `index`.
    pub fn one_hot(shape: impl Into<Shape>, index: usize) -> Self {
        let mut t = Self::zeros(shape);
        if let Some(v) = t.data.get_mut(index) {
            *v = 1.0;
        }
        t
    }

    /// Uniform values in `[-scale, scale)` drawn from a seeded generator.
    pub fn random(shape: impl Into<Shape>, scale: f64, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        Self::random_with(shape, scale, &mut rng)
    }

    /// Uniform values in `[-scale, scale)` drawn from `rng`.
    pub fn random_with<R: Rng>(shape: impl Into<Shape>, scale: f64, rng: &mut R) -> Self {
        let shape = shape.into();
        let data = (0..shape.numel())
            .map(|_| rng.gen_range(-1.0..1.0) * scale)
            .collect();
        Self { shape, data }
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn dims(&self) -> &[usize] {
        &self.shape.dims
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<f64> {
        self.data
    }

    /// Element at flat index.
    pub fn get(&self, index: usize) -> f64 {
        self.data[index]
    }

    /// Overwrite the element at flat index.
    pub fn set(&mut self, index: usize, value: f64) {
        self.data[index] = value;
    }

    /// Element-wise sum.
    pub fn add(&self, other: &Tensor) -> Result<Tensor, CoreError> {
        self.zip_with(other, |a, b| a + b)
    }

    /// Element-wise difference `self - other`.
    pub fn minus(&self, other: &Tensor) -> Result<Tensor, CoreError> {
        self.zip_with(other, |a, b| a - b)
    }

    /// Element-wise product.
    pub fn mul(&self, other: &Tensor) -> Result<Tensor, CoreError> {
        self.zip_with(other, |a, b| a * b)
    }

    /// Multiply every element by `factor`.
    pub fn scale(&self, factor: f64) -> Tensor {
        self.map(|x| x * factor)
    }

    /// Apply `f` to every element.
    pub fn map(&self, f: impl Fn(f64) -> f64) -> Tensor {
        Tensor {
            shape: self.shape.clone(),
            data: self.data.iter().map(|&x| f(x)).collect(),
        }
    }

    /// Combine two same-shaped tensors element by element.
    pub fn zip_with(
        &self,
        other: &Tensor,
        f: impl Fn(f64, f64) -> f64,
    ) -> Result<Tensor, CoreError> {
        self.check_same_shape(other)?;
        Ok(Tensor {
            shape: self.shape.clone(),
            data: self
                .data
                .iter()
                .zip(other.data.iter())
                .map(|(&a, &b)| f(a, b))
                .collect(),
        })
    }

    /// In-place `self += other`.
    pub fn add_assign(&mut self, other: &Tensor) -> Result<(), CoreError> {
        self.check_same_shape(other)?;
        for (a, b) in self.data.iter_mut().zip(other.data.iter()) {
            *a += b;
        }
        Ok(())
    }

    /// Inner product of the flattened buffers.
    pub fn dot(&self, other: &Tensor) -> Result<f64, CoreError> {
        self.check_same_shape(other)?;
        Ok(self.data.iter().zip(other.data.iter()).map(|(a, b)| a * b).sum())
    }

    pub fn sum(&self) -> f64 {
        self.data.iter().sum()
    }

    pub fn mean(&self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.sum() / self.data.len() as f64
    }

    /// Euclidean norm.
    pub fn l2(&self) -> f64 {
        self.data.iter().map(|x| x * x).sum::<f64>().sqrt()
    }

    /// True when no element is NaN or infinite.
    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|x| x.is_finite())
    }

    /// Same buffer, new dimensions.
    pub fn reshape(&self, shape: impl Into<Shape>) -> Result<Tensor, CoreError> {
        Tensor::from_data(shape, self.data.clone())
    }

    fn check_same_shape(&self, other: &Tensor) -> Result<(), CoreError> {
        if self.shape != other.shape {
            return Err(CoreError::ShapeMismatch {
                expected: self.shape.clone(),
                got: other.shape.clone(),
            });
        }
        Ok(())
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.shape.rank() == 0 {
            write!(f, "Tensor(scalar={})", self.data[0])
        } else {
            write!(f, "Tensor(shape={}, data={:?})", self.shape, self.data)
        }
    }
}

impl fmt::Display for Tensor {
    /// Rows of a rank-2 tensor on separate lines; everything else flat.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.shape.rank() == 2 {
            let cols = self.shape.dims[1].max(1);
            for row in self.data.chunks(cols) {
                let cells: Vec<String> = row.iter().map(|v| format!("{v:.6}")).collect();
                writeln!(f, "[{}]", cells.join(", "))?;
            }
            Ok(())
        } else {
            let cells: Vec<String> = self.data.iter().map(|v| format!("{v:.6}")).collect();
            write!(f, "[{}]", cells.join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_data_checks_count() {
        assert!(Tensor::from_data(vec![2, 2], vec![1.0; 4]).is_ok());
        let err = Tensor::from_data(vec![2, 2], vec![1.0; 3]).unwrap_err();
        assert!(matches!(
            err,
            CoreError::ElementCountMismatch {
                expected: 4,
                got: 3,
                ..
            }
        ));
    }

    #[test]
    fn test_arithmetic_does_not_alias() {
        let a = Tensor::vector(vec![1.0, 2.0]);
        let b = Tensor::vector(vec![3.0, 5.0]);
        let c = a.add(&b).unwrap();
        let d = c.minus(&b).unwrap();
        assert_eq!(c.data(), &[4.0, 7.0]);
        assert_eq!(d, a);
        assert_eq!(a.scale(2.0).data(), &[2.0, 4.0]);
        assert_eq!(a.data(), &[1.0, 2.0]);
    }

    #[test]
    fn test_shape_mismatch() {
        let a = Tensor::vector(vec![1.0, 2.0]);
        let b = Tensor::vector(vec![1.0, 2.0, 3.0]);
        assert!(matches!(a.add(&b), Err(CoreError::ShapeMismatch { .. })));
        assert!(a.dot(&b).is_err());
    }

    #[test]
    fn test_one_hot() {
        let t = Tensor::one_hot(vec![2, 2], 3);
        assert_eq!(t.data(), &[0.0, 0.0, 0.0, 1.0]);
        assert_eq!(t.sum(), 1.0);
    }

    #[test]
    fn test_random_is_seeded() {
        let a = Tensor::random(vec![3, 3], 1.0, 7);
        let b = Tensor::random(vec![3, 3], 1.0, 7);
        let c = Tensor::random(vec![3, 3], 1.0, 8);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.data().iter().all(|v| v.abs() <= 1.0));
    }

    #[test]
    fn test_reductions() {
        let t = Tensor::vector(vec![3.0, 4.0]);
        assert_eq!(t.sum(), 7.0);
        assert_eq!(t.mean(), 3.5);
        assert_eq!(t.l2(), 5.0);
        assert!(t.is_finite());
        assert!(!Tensor::vector(vec![f64::NAN]).is_finite());
    }
}
