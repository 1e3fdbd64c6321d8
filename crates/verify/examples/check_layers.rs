//! Check Layers: gradient verification of the reference layers
//!
//! Run with: cargo run --example check_layers
//!
//! This example demonstrates:
//! - Running the standard component suite against several layers
//! - Reading a tolerance report when a check fails

use converge_core::Layer;
use converge_layers::{Bias, DagNetwork, Dense, MeanSqLoss, Sigmoid};
use converge_verify::{random_inputs, TestSuite, VerifyConfig, VerifyError};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = VerifyConfig::default().with_performance_samples(5);
    let suite = TestSuite::standard(&config);

    let mut net = DagNetwork::new("mlp", 2);
    let x = net.input(0)?;
    let t = net.input(1)?;
    let h = net.add(Dense::random(4, 3, 0.5, 1), &[x])?;
    let h = net.add(Bias::new(vec![3]), &[h])?;
    let h = net.add(Sigmoid::new(), &[h])?;
    let y = net.add(Dense::random(3, 1, 0.5, 2), &[h])?;
    let loss = net.add(MeanSqLoss::new(), &[y, t])?;
    net.set_output(loss)?;

    let cases: Vec<(Box<dyn Layer>, Vec<Vec<usize>>)> = vec![
        (Box::new(Dense::random(4, 3, 1.0, 0)), vec![vec![4]]),
        (Box::new(Sigmoid::new()), vec![vec![4]]),
        (Box::new(net), vec![vec![4], vec![1]]),
    ];

    for (seed, (layer, dims)) in cases.iter().enumerate() {
        println!("--- {} ---", layer.name());
        match suite.run(layer.as_ref(), &random_inputs(dims, seed as u64)) {
            Ok(summaries) => {
                for (name, summary) in summaries {
                    println!("{name:>12}: {summary}");
                }
            }
            Err(VerifyError::ToleranceExceeded(failure)) => {
                println!("{failure}");
                println!("{}", failure.report);
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}
