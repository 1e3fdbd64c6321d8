//! Regression: fitting a small network with each orientation strategy
//!
//! Run with: cargo run --example regression
//!
//! This example demonstrates:
//! - Binding a loss network and data rows into a trainable
//! - Comparing steepest descent, momentum and L-BFGS on the same problem
//! - Recording the loss history and printing it as JSON

use converge_core::Tensor;
use converge_layers::{Bias, DagNetwork, Dense, MeanSqLoss, NoiseLayer, Sigmoid};
use converge_optim::{
    BasicTrainable, CompositeMonitor, HistoryMonitor, IterativeTrainer, LoggingMonitor,
    Orientation, RetryingMonitor, TrainerConfig,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// `t = sin(x0) + x1 / 2` on random points in `[-1, 1)²`.
fn dataset(rows: usize, seed: u64) -> Vec<Vec<Tensor>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..rows)
        .map(|_| {
            let x0 = rng.gen_range(-1.0..1.0);
            let x1 = rng.gen_range(-1.0..1.0);
            let t: f64 = f64::sin(x0) + x1 / 2.0;
            vec![Tensor::vector(vec![x0, x1]), Tensor::vector(vec![t])]
        })
        .collect()
}

fn network() -> Result<DagNetwork, converge_core::CoreError> {
    let mut net = DagNetwork::new("regression", 2);
    let x = net.input(0)?;
    let t = net.input(1)?;
    let h = net.add(Dense::random(2, 8, 0.5, 11), &[x])?;
    let h = net.add(Bias::new(vec![8]), &[h])?;
    let h = net.add(Sigmoid::new(), &[h])?;
    let h = net.add(NoiseLayer::new(8, 0.9), &[h])?;
    let y = net.add(Dense::random(8, 1, 0.5, 12), &[h])?;
    let loss = net.add(MeanSqLoss::new(), &[y, t])?;
    net.set_output(loss)?;
    Ok(net)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let data = dataset(64, 7);
    let strategies = [
        ("gradient descent", Orientation::GradientDescent),
        ("momentum", Orientation::momentum(0.5)),
        ("l-bfgs", Orientation::lbfgs()),
    ];

    for (label, orientation) in strategies {
        let history = HistoryMonitor::new();
        let records = history.records();
        let monitor = CompositeMonitor::new()
            .with(LoggingMonitor::new())
            .with(RetryingMonitor::new(3))
            .with(history.clone());

        let config = TrainerConfig::new()
            .with_max_iterations(200)
            .with_iterations_per_sample(25)
            .with_terminate_threshold(1e-4)
            .with_seed(1);
        let mut trainer = IterativeTrainer::new(BasicTrainable::new(network()?, data.clone()))
            .with_monitor(monitor)
            .with_orientation(orientation)
            .with_config(config);
        let result = trainer.run()?;

        println!(
            "{label:>16}: {} after {} iterations ({} committed), mean {:.6e}",
            result.termination_cause, result.iterations, result.history_len, result.final_mean
        );
        println!("{:>16}  {} history records", "", records.borrow().len());
        println!("{}", history.to_json()?);
    }

    Ok(())
}
