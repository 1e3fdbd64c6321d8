//! # Tensor Lists
//!
//! An ordered, batch-indexed sequence of tensors sharing one item shape.
//! A `TensorList` is what flows between layers: one row per batch item.

use std::ops::Index;

use crate::error::CoreError;
use crate::shape::Shape;
use crate::tensor::Tensor;

/// A mini-batch of same-shaped tensors.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorList {
    items: Vec<Tensor>,
}

impl TensorList {
    /// Build a batch, checking that every item has the same dimensions.
    pub fn new(items: Vec<Tensor>) -> Result<Self, CoreError> {
        if let Some(first) = items.first() {
            for item in &items[1..] {
                if item.shape() != first.shape() {
                    return Err(CoreError::ShapeMismatch {
                        expected: first.shape().clone(),
                        got: item.shape().clone(),
                    });
                }
            }
        }
        Ok(Self { items })
    }

    /// A batch of one.
    pub fn single(item: Tensor) -> Self {
        Self { items: vec![item] }
    }

    /// `n` deep copies of `item`.
    pub fn repeat(item: &Tensor, n: usize) -> Self {
        Self {
            items: vec![item.clone(); n],
        }
    }

    /// Batch size.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Per-item dimensions (empty shape for an empty batch).
    pub fn dims(&self) -> &[usize] {
        self.items.first().map(|t| t.dims()).unwrap_or(&[])
    }

    /// Per-item shape.
    pub fn item_shape(&self) -> Shape {
        Shape::new(self.dims().to_vec())
    }

    /// Elements per item.
    pub fn item_len(&self) -> usize {
        self.items.first().map(|t| t.len()).unwrap_or(0)
    }

    pub fn get(&self, index: usize) -> Option<&Tensor> {
        self.items.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Tensor> {
        self.items.iter()
    }

    pub fn items(&self) -> &[Tensor] {
        &self.items
    }

    pub fn into_items(self) -> Vec<Tensor> {
        self.items
    }

    /// Same batch size and item shape, all zeros.
    pub fn zeros_like(&self) -> TensorList {
        self.map(|t| Tensor::zeros(t.shape().clone()))
    }

    /// Same batch size and item shape, all ones.
    pub fn ones_like(&self) -> TensorList {
        self.map(|t| Tensor::full(t.shape().clone(), 1.0))
    }

    /// Apply `f` to every item.
    pub fn map(&self, f: impl Fn(&Tensor) -> Tensor) -> TensorList {
        TensorList {
            items: self.items.iter().map(f).collect(),
        }
    }

    /// Item-wise sum of two batches of equal length and shape.
    pub fn add(&self, other: &TensorList) -> Result<TensorList, CoreError> {
        if self.len() != other.len() {
            return Err(CoreError::BatchLength {
                expected: self.len(),
                got: other.len(),
            });
        }
        let items = self
            .items
            .iter()
            .zip(other.items.iter())
            .map(|(a, b)| a.add(b))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(TensorList { items })
    }

    /// Multiply every item by `factor`.
    pub fn scale(&self, factor: f64) -> TensorList {
        self.map(|t| t.scale(factor))
    }

    /// Sum of every element across the batch.
    pub fn sum(&self) -> f64 {
        self.items.iter().map(Tensor::sum).sum()
    }

    pub fn is_finite(&self) -> bool {
        self.items.iter().all(Tensor::is_finite)
    }
}

impl Index<usize> for TensorList {
    type Output = Tensor;

    fn index(&self, index: usize) -> &Tensor {
        &self.items[index]
    }
}

impl<'a> IntoIterator for &'a TensorList {
    type Item = &'a Tensor;
    type IntoIter = std::slice::Iter<'a, Tensor>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl From<Tensor> for TensorList {
    fn from(item: Tensor) -> Self {
        Self::single(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_ragged_batch() {
        let err = TensorList::new(vec![
            Tensor::vector(vec![1.0, 2.0]),
            Tensor::vector(vec![1.0]),
        ])
        .unwrap_err();
        assert!(matches!(err, CoreError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_repeat_and_dims() {
        let list = TensorList::repeat(&Tensor::zeros(vec![2, 3]), 4);
        assert_eq!(list.len(), 4);
        assert_eq!(list.dims(), &[2, 3]);
        assert_eq!(list.item_len(), 6);
    }

    #[test]
    fn test_add_checks_batch_length() {
        let a = TensorList::repeat(&Tensor::vector(vec![1.0]), 2);
        let b = TensorList::repeat(&Tensor::vector(vec![1.0]), 3);
        assert!(matches!(a.add(&b), Err(CoreError::BatchLength { .. })));
        let c = a.add(&a).unwrap();
        assert_eq!(c.sum(), 4.0);
    }

    #[test]
    fn test_empty_batch() {
        let empty = TensorList::new(vec![]).unwrap();
        assert!(empty.is_empty());
        assert_eq!(empty.dims(), &[] as &[usize]);
    }
}
