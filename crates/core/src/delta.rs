//! # Deltas
//!
//! Gradient accumulation buffers keyed by the identity of the slot they
//! belong to. A slot is either a learnable parameter array owned by a layer
//! or a synthetic input slot created by a caller that wants to read back the
//! gradient flowing into one of its inputs.
//!
//! Contributions to the same slot are always summed, never overwritten: a
//! value used twice in a network receives the sum of both uses' gradients
//! (multivariate chain rule).
//!
//! ```rust
//! use converge_core::{DeltaSet, SlotId};
//!
//! let slot = SlotId::fresh();
//! let mut deltas = DeltaSet::new();
//! deltas.accumulate(slot, &[1.0, 2.0]).unwrap();
//! deltas.accumulate(slot, &[0.5, 0.5]).unwrap();
//! assert_eq!(deltas.get(slot).unwrap().values(), &[1.5, 2.5]);
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::CoreError;
use crate::layer::Layer;
use crate::shape::Shape;

/// Opaque, process-unique identity of a parameter array or input slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotId(u64);

impl SlotId {
    /// Allocate a new identity that no other slot shares.
    pub fn fresh() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        SlotId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot#{}", self.0)
    }
}

/// An accumulation buffer for one target slot.
#[derive(Debug, Clone, PartialEq)]
pub struct Delta {
    target: SlotId,
    values: Vec<f64>,
}

impl Delta {
    /// A zero buffer of `len` elements for `target`.
    pub fn zeros(target: SlotId, len: usize) -> Self {
        Self {
            target,
            values: vec![0.0; len],
        }
    }

    pub fn target(&self) -> SlotId {
        self.target
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Add `contribution` element-wise.
    pub fn accumulate(&mut self, contribution: &[f64]) -> Result<(), CoreError> {
        if contribution.len() != self.values.len() {
            return Err(CoreError::ShapeMismatch {
                expected: Shape::vector(self.values.len()),
                got: Shape::vector(contribution.len()),
            });
        }
        for (v, c) in self.values.iter_mut().zip(contribution) {
            *v += c;
        }
        Ok(())
    }

    pub fn dot(&self, other: &Delta) -> f64 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| a * b)
            .sum()
    }
}

/// A mapping from slot identity to its accumulated delta.
///
/// Iteration order is the slot allocation order, so anything folded over a
/// `DeltaSet` (dot products, magnitudes) is deterministic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeltaSet {
    map: BTreeMap<SlotId, Delta>,
}

impl DeltaSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The delta for `key`, created zero-filled if absent.
    pub fn get_or_create(&mut self, key: SlotId, len: usize) -> &mut Delta {
        self.map.entry(key).or_insert_with(|| Delta::zeros(key, len))
    }

    /// Add `contribution` into the delta for `key`.
    pub fn accumulate(&mut self, key: SlotId, contribution: &[f64]) -> Result<(), CoreError> {
        self.get_or_create(key, contribution.len())
            .accumulate(contribution)
    }

    pub fn get(&self, key: SlotId) -> Option<&Delta> {
        self.map.get(&key)
    }

    pub fn contains(&self, key: SlotId) -> bool {
        self.map.contains_key(&key)
    }

    pub fn keys(&self) -> impl Iterator<Item = SlotId> + '_ {
        self.map.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Delta> {
        self.map.values()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Drop the entry for `key`, returning it.
    pub fn remove(&mut self, key: SlotId) -> Option<Delta> {
        self.map.remove(&key)
    }

    /// Add every entry of `other` into `self`.
    pub fn merge(&mut self, other: &DeltaSet) -> Result<(), CoreError> {
        for delta in other.iter() {
            self.accumulate(delta.target, &delta.values)?;
        }
        Ok(())
    }

    /// A new set with every value multiplied by `factor`.
    pub fn scale(&self, factor: f64) -> DeltaSet {
        self.map_values(|v| v * factor)
    }

    /// A new set with `f` applied to every value.
    pub fn map_values(&self, f: impl Fn(f64) -> f64) -> DeltaSet {
        let map = self
            .map
            .iter()
            .map(|(k, d)| {
                (
                    *k,
                    Delta {
                        target: d.target,
                        values: d.values.iter().map(|&v| f(v)).collect(),
                    },
                )
            })
            .collect();
        DeltaSet { map }
    }

    /// `self + factor * other`, over the union of keys.
    pub fn add_scaled(&self, other: &DeltaSet, factor: f64) -> Result<DeltaSet, CoreError> {
        let mut out = self.clone();
        out.merge(&other.scale(factor))?;
        Ok(out)
    }

    /// `self - other`, over the union of keys.
    pub fn subtract(&self, other: &DeltaSet) -> Result<DeltaSet, CoreError> {
        self.add_scaled(other, -1.0)
    }

    /// Inner product over the keys both sets share.
    pub fn dot(&self, other: &DeltaSet) -> f64 {
        self.map
            .iter()
            .filter_map(|(k, d)| other.map.get(k).map(|o| d.dot(o)))
            .sum()
    }

    /// Euclidean norm over every entry.
    pub fn magnitude(&self) -> f64 {
        self.dot(self).sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.iter().all(|d| d.values.iter().all(|v| v.is_finite()))
    }

    /// Add `factor * delta` into the matching `state()` params of `layer`.
    ///
    /// Entries whose slot isn't one of the layer's params are ignored.
    pub fn apply(&self, layer: &mut dyn Layer, factor: f64) -> Result<(), CoreError> {
        for param in layer.state_mut() {
            if let Some(delta) = self.map.get(&param.id) {
                if delta.len() != param.value.len() {
                    return Err(CoreError::shape_mismatch(
                        param.value.dims(),
                        &[delta.len()],
                    ));
                }
                for (w, d) in param.value.data_mut().iter_mut().zip(delta.values.iter()) {
                    *w += factor * d;
                }
            }
        }
        Ok(())
    }
}

/// A snapshot of a layer's parameter values, keyed by slot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateSet {
    map: BTreeMap<SlotId, Vec<f64>>,
}

impl StateSet {
    /// Copy the current value of every `state()` param of `layer`.
    pub fn capture(layer: &dyn Layer) -> Self {
        let map = layer
            .state()
            .into_iter()
            .map(|p| (p.id, p.value.data().to_vec()))
            .collect();
        Self { map }
    }

    /// Write the snapshot back into `layer`.
    pub fn restore(&self, layer: &mut dyn Layer) -> Result<(), CoreError> {
        for param in layer.state_mut() {
            if let Some(values) = self.map.get(&param.id) {
                if values.len() != param.value.len() {
                    return Err(CoreError::shape_mismatch(
                        param.value.dims(),
                        &[values.len()],
                    ));
                }
                param.value.data_mut().copy_from_slice(values);
            }
        }
        Ok(())
    }

    pub fn get(&self, key: SlotId) -> Option<&[f64]> {
        self.map.get(&key).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// `self - other` as a delta set, over the slots both snapshots hold.
    pub fn subtract(&self, other: &StateSet) -> DeltaSet {
        let mut out = DeltaSet::new();
        for (k, a) in &self.map {
            if let Some(b) = other.map.get(k) {
                let diff: Vec<f64> = a.iter().zip(b).map(|(x, y)| x - y).collect();
                out.map.insert(
                    *k,
                    Delta {
                        target: *k,
                        values: diff,
                    },
                );
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_ids_are_unique() {
        let a = SlotId::fresh();
        let b = SlotId::fresh();
        assert_ne!(a, b);
        assert!(a < b);
    }

    #[test]
    fn test_lazy_zero_creation() {
        let slot = SlotId::fresh();
        let mut set = DeltaSet::new();
        assert!(set.get(slot).is_none());
        let delta = set.get_or_create(slot, 3);
        assert_eq!(delta.values(), &[0.0, 0.0, 0.0]);
        assert!(set.contains(slot));
    }

    #[test]
    fn test_accumulate_adds_not_replaces() {
        let slot = SlotId::fresh();
        let mut set = DeltaSet::new();
        set.accumulate(slot, &[1.0, 1.0]).unwrap();
        set.accumulate(slot, &[1.0, 1.0]).unwrap();
        assert_eq!(set.get(slot).unwrap().values(), &[2.0, 2.0]);
    }

    #[test]
    fn test_accumulate_length_mismatch() {
        let slot = SlotId::fresh();
        let mut set = DeltaSet::new();
        set.accumulate(slot, &[1.0, 1.0]).unwrap();
        assert!(set.accumulate(slot, &[1.0]).is_err());
    }

    #[test]
    fn test_merge_and_dot() {
        let a_slot = SlotId::fresh();
        let b_slot = SlotId::fresh();
        let mut a = DeltaSet::new();
        a.accumulate(a_slot, &[1.0, 2.0]).unwrap();
        let mut b = DeltaSet::new();
        b.accumulate(a_slot, &[3.0, 4.0]).unwrap();
        b.accumulate(b_slot, &[5.0]).unwrap();

        assert_eq!(a.dot(&b), 11.0);
        a.merge(&b).unwrap();
        assert_eq!(a.get(a_slot).unwrap().values(), &[4.0, 6.0]);
        assert_eq!(a.get(b_slot).unwrap().values(), &[5.0]);
        assert_eq!(a.len(), 2);
    }

    #[test]
    fn test_scale_and_subtract() {
        let slot = SlotId::fresh();
        let mut a = DeltaSet::new();
        a.accumulate(slot, &[3.0, 4.0]).unwrap();
        assert_eq!(a.magnitude(), 5.0);
        let zero = a.subtract(&a).unwrap();
        assert_eq!(zero.get(slot).unwrap().values(), &[0.0, 0.0]);
        assert_eq!(a.scale(-2.0).get(slot).unwrap().values(), &[-6.0, -8.0]);
    }
}
