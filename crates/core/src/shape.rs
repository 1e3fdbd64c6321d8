//! # Shapes
//!
//! A shape is the ordered list of a tensor's dimensions. Layers check
//! shapes at their boundaries and refuse to evaluate when they disagree,
//! so a `Shape` is mostly compared, displayed and multiplied out.
//!
//! Dimensions are checked at runtime (`Vec<usize>`) rather than through
//! const generics: layers and networks are assembled dynamically and the
//! verification engine probes whatever shape a layer reports.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The dimensions of a dense tensor.
///
/// An empty dimension list is a scalar (one element).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Shape {
    /// Dimension sizes (empty = scalar, [n] = vector, [m, n] = matrix, ...)
    pub dims: Vec<usize>,
}

impl Shape {
    /// Create a shape from its dimensions.
    pub fn new(dims: Vec<usize>) -> Self {
        Self { dims }
    }

    /// A scalar shape (rank 0, one element).
    pub fn scalar() -> Self {
        Self { dims: vec![] }
    }

    /// A vector shape.
    pub fn vector(len: usize) -> Self {
        Self { dims: vec![len] }
    }

    /// A matrix shape.
    pub fn matrix(rows: usize, cols: usize) -> Self {
        Self {
            dims: vec![rows, cols],
        }
    }

    /// Number of dimensions.
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Total number of elements.
    pub fn numel(&self) -> usize {
        self.dims.iter().product()
    }

    /// The raw dimensions.
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Self::new(dims)
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Self::new(dims.to_vec())
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}]",
            self.dims
                .iter()
                .map(|d| d.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_shape() {
        let s = Shape::scalar();
        assert_eq!(s.rank(), 0);
        assert_eq!(s.numel(), 1);
        assert_eq!(s.to_string(), "[]");
    }

    #[test]
    fn test_vector_shape() {
        let v = Shape::vector(10);
        assert_eq!(v.rank(), 1);
        assert_eq!(v.numel(), 10);
        assert_eq!(v.to_string(), "[10]");
    }

    #[test]
    fn test_matrix_shape() {
        let m = Shape::matrix(3, 4);
        assert_eq!(m.rank(), 2);
        assert_eq!(m.numel(), 12);
        assert_eq!(m.to_string(), "[3, 4]");
    }

    #[test]
    fn test_shape_from_dims() {
        let a: Shape = vec![2, 3].into();
        let b: Shape = (&[2usize, 3][..]).into();
        assert_eq!(a, b);
        assert_ne!(a, Shape::matrix(3, 2));
    }
}
