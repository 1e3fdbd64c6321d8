//! Deltas: accumulating gradients by slot
//!
//! Run with: cargo run --example deltas
//!
//! This example demonstrates:
//! - Building tensors and batches
//! - Reading the gradient that flows into an input slot
//! - Summing contributions from a value that is used twice

use converge_core::{DeltaSet, Evaluation, SlotId, Tensor, TensorList};

fn main() {
    println!("=== Deltas ===\n");

    // -------------------------------------------------------------------------
    // Tensors and batches
    // -------------------------------------------------------------------------
    let x = Tensor::vector(vec![1.0, -1.0]);
    let batch = TensorList::repeat(&x, 3);
    println!("item dims {:?}, batch size {}", batch.dims(), batch.len());

    // -------------------------------------------------------------------------
    // Input slots
    // -------------------------------------------------------------------------
    let slot = SlotId::fresh();
    let input = Evaluation::slot(TensorList::single(x), slot);

    let mut deltas = DeltaSet::new();
    let gradient = TensorList::single(Tensor::vector(vec![0.25, 0.5]));
    // The same evaluation consumed twice: contributions add up.
    for _ in 0..2 {
        if let Err(e) = input.accumulate(&mut deltas, &gradient) {
            eprintln!("accumulate failed: {e}");
            return;
        }
    }

    if let Some(delta) = deltas.get(slot) {
        println!("{} received {:?}", slot, delta.values());
    }
    println!("magnitude {:.4}", deltas.magnitude());
}
