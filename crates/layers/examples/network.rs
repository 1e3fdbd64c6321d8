//! Networks: wiring layers into a graph
//!
//! Run with: cargo run --example network
//!
//! This example demonstrates:
//! - Building a small regression network
//! - Reading per-parameter gradients after one backward pass
//! - Taking a plain gradient step

use converge_core::{DeltaSet, Evaluation, Layer, Tensor, TensorList};
use converge_layers::{Bias, DagNetwork, Dense, MeanSqLoss};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Network ===\n");

    let mut net = DagNetwork::new("linear_regression", 2);
    let x = net.input(0)?;
    let t = net.input(1)?;
    let y = net.add(Dense::random(3, 1, 0.1, 7).with_name("w"), &[x])?;
    let y = net.add(Bias::new(vec![1]).with_name("b"), &[y])?;
    let loss = net.add(MeanSqLoss::new(), &[y, t])?;
    net.set_output(loss)?;

    println!("{} nodes, {} parameters", net.node_count(), net.num_parameters());

    let rows = TensorList::new(vec![
        Tensor::vector(vec![1.0, 0.0, 0.0]),
        Tensor::vector(vec![0.0, 1.0, 0.0]),
        Tensor::vector(vec![0.0, 0.0, 1.0]),
    ])?;
    let targets = TensorList::new(vec![
        Tensor::vector(vec![1.0]),
        Tensor::vector(vec![2.0]),
        Tensor::vector(vec![3.0]),
    ])?;

    for step in 0..5 {
        let out = net.eval(&[
            Evaluation::constant(rows.clone()),
            Evaluation::constant(targets.clone()),
        ])?;
        let mean = out.data().sum() / out.data().len() as f64;

        let mut deltas = DeltaSet::new();
        out.accumulate(&mut deltas, &out.data().ones_like())?;
        println!("step {step}: mean loss {mean:.6}, |grad| {:.6}", deltas.magnitude());
        deltas.apply(&mut net, -0.1)?;
    }

    Ok(())
}
