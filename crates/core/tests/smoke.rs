//! Smoke tests for the core crate.
//!
//! These tests verify that the layer contract holds end to end:
//! - A layer's evaluation accumulates into its own slots and its inputs
//! - Frozen layers still propagate gradient to their inputs
//! - Delta sets can be applied to, and snapshots restored into, a layer

use converge_core::{
    expect_inputs, CoreError, DeltaSet, Evaluation, Layer, LayerHeader, Param, SlotId, StateSet,
    Tensor, TensorList,
};

// ============================================================================
// A minimal test layer: y = w * x (element-wise)
// ============================================================================

#[derive(Debug, Clone)]
struct Scale {
    header: LayerHeader,
    weights: Param,
}

impl Scale {
    fn new(weights: Vec<f64>) -> Self {
        Self {
            header: LayerHeader::new("scale"),
            weights: Param::new("weights", Tensor::vector(weights)),
        }
    }
}

impl Layer for Scale {
    fn header(&self) -> &LayerHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut LayerHeader {
        &mut self.header
    }

    fn state(&self) -> Vec<&Param> {
        vec![&self.weights]
    }

    fn state_mut(&mut self) -> Vec<&mut Param> {
        vec![&mut self.weights]
    }

    fn eval(&self, inputs: &[Evaluation]) -> Result<Evaluation, CoreError> {
        self.assert_alive()?;
        expect_inputs(inputs, 1)?;
        let input = inputs[0].clone();
        let w = self.weights.value.clone();
        let out = input
            .data()
            .iter()
            .map(|x| x.mul(&w))
            .collect::<Result<Vec<_>, _>>()?;
        let frozen = self.is_frozen();
        let slot = self.weights.id;
        Ok(Evaluation::new(TensorList::new(out)?, move |deltas, grad| {
            if !frozen {
                let mut dw = vec![0.0; w.len()];
                for (x, g) in input.data().iter().zip(grad.iter()) {
                    for (i, d) in dw.iter_mut().enumerate() {
                        *d += x.get(i) * g.get(i);
                    }
                }
                deltas.accumulate(slot, &dw)?;
            }
            if input.is_alive() {
                let back = grad.map(|g| g.mul(&w).unwrap_or_else(|_| g.clone()));
                input.accumulate(deltas, &back)?;
            }
            Ok(())
        }))
    }

    fn boxed_clone(&self) -> Box<dyn Layer> {
        Box::new(self.clone())
    }
}

fn input(values: Vec<f64>) -> (SlotId, Evaluation) {
    let slot = SlotId::fresh();
    let eval = Evaluation::slot(TensorList::single(Tensor::vector(values)), slot);
    (slot, eval)
}

// ============================================================================
// Evaluation Tests
// ============================================================================

#[test]
fn smoke_forward_and_backward() {
    let layer = Scale::new(vec![2.0, 3.0]);
    let (in_slot, x) = input(vec![1.0, -1.0]);
    let out = layer.eval(&[x]).unwrap();
    assert_eq!(out.data()[0].data(), &[2.0, -3.0]);

    let mut deltas = DeltaSet::new();
    out.accumulate(&mut deltas, &out.data().ones_like()).unwrap();
    assert_eq!(deltas.get(layer.weights.id).unwrap().values(), &[1.0, -1.0]);
    assert_eq!(deltas.get(in_slot).unwrap().values(), &[2.0, 3.0]);
}

#[test]
fn smoke_frozen_layer_propagates_to_inputs_only() {
    let mut layer = Scale::new(vec![2.0, 3.0]);
    layer.freeze();
    let (in_slot, x) = input(vec![1.0, 1.0]);
    let out = layer.eval(&[x]).unwrap();

    let mut deltas = DeltaSet::new();
    out.accumulate(&mut deltas, &out.data().ones_like()).unwrap();
    assert!(!deltas.contains(layer.weights.id));
    assert!(deltas.contains(in_slot));
}

#[test]
fn smoke_reused_value_sums_gradients() {
    let layer = Scale::new(vec![1.0]);
    let (in_slot, x) = input(vec![5.0]);
    let a = layer.eval(&[x.clone()]).unwrap();
    let b = layer.eval(&[x]).unwrap();

    let mut deltas = DeltaSet::new();
    let ones = a.data().ones_like();
    a.accumulate(&mut deltas, &ones).unwrap();
    b.accumulate(&mut deltas, &ones).unwrap();
    assert_eq!(deltas.get(in_slot).unwrap().values(), &[2.0]);
    assert_eq!(deltas.get(layer.weights.id).unwrap().values(), &[10.0]);
}

#[test]
fn smoke_disposed_layer_refuses_eval() {
    let mut layer = Scale::new(vec![1.0]);
    layer.dispose();
    let (_, x) = input(vec![1.0]);
    assert!(matches!(
        layer.eval(&[x]),
        Err(CoreError::Disposed { .. })
    ));
}

#[test]
fn smoke_wrong_input_count() {
    let layer = Scale::new(vec![1.0]);
    assert!(matches!(
        layer.eval(&[]),
        Err(CoreError::InputCount {
            expected: 1,
            got: 0
        })
    ));
}

// ============================================================================
// State Tests
// ============================================================================

#[test]
fn smoke_apply_and_restore() {
    let mut layer = Scale::new(vec![1.0, 2.0]);
    let snapshot = StateSet::capture(&layer);

    let mut step = DeltaSet::new();
    step.accumulate(layer.weights.id, &[0.5, 0.5]).unwrap();
    step.accumulate(SlotId::fresh(), &[9.0]).unwrap();
    step.apply(&mut layer, 2.0).unwrap();
    assert_eq!(layer.weights.value.data(), &[2.0, 3.0]);

    let moved = StateSet::capture(&layer).subtract(&snapshot);
    assert_eq!(moved.get(layer.weights.id).unwrap().values(), &[1.0, 1.0]);

    snapshot.restore(&mut layer).unwrap();
    assert_eq!(layer.weights.value.data(), &[1.0, 2.0]);
}

#[test]
fn smoke_copy_shares_slots() {
    let layer = Scale::new(vec![1.0, 2.0]);
    let copy = layer.boxed_clone();
    assert_eq!(copy.state()[0].id, layer.weights.id);
    assert_eq!(copy.num_parameters(), 2);
}
