//! Integration tests for composing layers into networks.

use approx::assert_abs_diff_eq;
use converge_core::{DeltaSet, Evaluation, Layer, SlotId, StateSet, Tensor, TensorList};
use converge_layers::{Bias, DagNetwork, Dense, MeanSqLoss, Sigmoid};

fn mlp() -> DagNetwork {
    let mut net = DagNetwork::new("mlp", 2);
    let x = net.input(0).unwrap();
    let t = net.input(1).unwrap();
    let h = net.add(Dense::random(2, 3, 0.5, 42), &[x]).unwrap();
    let h = net.add(Bias::new(vec![3]), &[h]).unwrap();
    let h = net.add(Sigmoid::new(), &[h]).unwrap();
    let y = net.add(Dense::random(3, 1, 0.5, 43), &[h]).unwrap();
    let loss = net.add(MeanSqLoss::new(), &[y, t]).unwrap();
    net.set_output(loss).unwrap();
    net
}

fn loss_at(net: &DagNetwork, x: &[f64], t: f64) -> f64 {
    let x = Evaluation::constant(TensorList::single(Tensor::vector(x.to_vec())));
    let t = Evaluation::constant(TensorList::single(Tensor::vector(vec![t])));
    net.eval(&[x, t]).unwrap().data().sum()
}

#[test]
fn test_network_input_gradient_matches_central_difference() {
    let net = mlp();
    let x = [0.3, -0.7];
    let slot = SlotId::fresh();
    let input = Evaluation::slot(TensorList::single(Tensor::vector(x.to_vec())), slot);
    let target = Evaluation::constant(TensorList::single(Tensor::vector(vec![1.0])));
    let out = net.eval(&[input, target]).unwrap();

    let mut deltas = DeltaSet::new();
    out.accumulate(&mut deltas, &out.data().ones_like()).unwrap();
    let analytic = deltas.get(slot).unwrap().values().to_vec();

    let h = 1e-6;
    for i in 0..2 {
        let mut plus = x;
        let mut minus = x;
        plus[i] += h;
        minus[i] -= h;
        let numeric = (loss_at(&net, &plus, 1.0) - loss_at(&net, &minus, 1.0)) / (2.0 * h);
        assert_abs_diff_eq!(analytic[i], numeric, epsilon = 1e-6);
    }
}

#[test]
fn test_gradient_step_reduces_loss() {
    let mut net = mlp();
    let x = Evaluation::constant(TensorList::single(Tensor::vector(vec![0.3, -0.7])));
    let t = Evaluation::constant(TensorList::single(Tensor::vector(vec![1.0])));
    let out = net.eval(&[x, t]).unwrap();
    let before = out.data().sum();

    let mut deltas = DeltaSet::new();
    out.accumulate(&mut deltas, &out.data().ones_like()).unwrap();
    assert_eq!(deltas.len(), 3);

    let snapshot = StateSet::capture(&net);
    deltas.apply(&mut net, -0.1).unwrap();
    let after = loss_at(&net, &[0.3, -0.7], 1.0);
    assert!(after < before, "{after} !< {before}");

    snapshot.restore(&mut net).unwrap();
    assert_abs_diff_eq!(loss_at(&net, &[0.3, -0.7], 1.0), before);
}

#[test]
fn test_copy_is_independent_but_shares_slots() {
    let net = mlp();
    let mut copy = net.boxed_clone();
    let ids: Vec<_> = net.state().iter().map(|p| p.id).collect();
    let copy_ids: Vec<_> = copy.state().iter().map(|p| p.id).collect();
    assert_eq!(ids, copy_ids);

    for p in copy.state_mut() {
        p.value = p.value.scale(0.0);
    }
    assert!(net.state().iter().any(|p| p.value.l2() > 0.0));
}

#[test]
fn test_disposed_network_cannot_eval() {
    let mut net = mlp();
    net.dispose();
    assert!(net.layers().all(|l| l.assert_alive().is_err()));
    let x = Evaluation::constant(TensorList::single(Tensor::vector(vec![0.0, 0.0])));
    let t = Evaluation::constant(TensorList::single(Tensor::vector(vec![0.0])));
    assert!(net.eval(&[x, t]).is_err());
}
