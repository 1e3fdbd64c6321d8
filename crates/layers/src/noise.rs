//! # Noise Layer
//!
//! A stochastic multiplicative mask (inverted dropout). The mask is fixed
//! between `reseed` calls, so within one sample the layer is a
//! deterministic, differentiable function of its input. `clear_noise`
//! drops the mask and the layer becomes the identity.

use converge_core::{
    expect_dims, expect_inputs, CoreError, Evaluation, Layer, LayerHeader, Param, Tensor,
    TensorList,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

/// Inverted-dropout mask over items of `size` elements.
#[derive(Debug, Clone)]
pub struct NoiseLayer {
    header: LayerHeader,
    size: usize,
    keep: f64,
    mask: Option<Tensor>,
}

impl NoiseLayer {
    /// `keep` is the probability an element survives; it is clamped to `(0, 1]`.
    pub fn new(size: usize, keep: f64) -> Self {
        Self {
            header: LayerHeader::new("noise"),
            size,
            keep: keep.clamp(f64::MIN_POSITIVE, 1.0),
            mask: None,
        }
    }

    pub fn mask(&self) -> Option<&Tensor> {
        self.mask.as_ref()
    }
}

impl Layer for NoiseLayer {
    fn header(&self) -> &LayerHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut LayerHeader {
        &mut self.header
    }

    fn state(&self) -> Vec<&Param> {
        Vec::new()
    }

    fn state_mut(&mut self) -> Vec<&mut Param> {
        Vec::new()
    }

    fn eval(&self, inputs: &[Evaluation]) -> Result<Evaluation, CoreError> {
        self.assert_alive()?;
        expect_inputs(inputs, 1)?;
        let input = inputs[0].clone();
        expect_dims(&input, &[self.size])?;

        let Some(mask) = self.mask.clone() else {
            return Ok(input);
        };
        let out = input
            .data()
            .iter()
            .map(|x| x.mul(&mask))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Evaluation::new(TensorList::new(out)?, move |deltas, grad| {
            if !input.is_alive() {
                return Ok(());
            }
            let back = grad
                .iter()
                .map(|g| g.mul(&mask))
                .collect::<Result<Vec<_>, _>>()?;
            input.accumulate(deltas, &TensorList::new(back)?)
        }))
    }

    fn boxed_clone(&self) -> Box<dyn Layer> {
        Box::new(self.clone())
    }

    fn reseed(&mut self, seed: u64) -> bool {
        let mut rng = StdRng::seed_from_u64(seed);
        let scale = 1.0 / self.keep;
        let data = (0..self.size)
            .map(|_| if rng.gen::<f64>() < self.keep { scale } else { 0.0 })
            .collect();
        let mask = Tensor::vector(data);
        let dropped = mask.data().iter().filter(|&&m| m == 0.0).count();
        debug!(layer = %self.name(), seed, dropped, "Reseeded noise mask");
        self.mask = Some(mask);
        true
    }

    fn clear_noise(&mut self) {
        self.mask = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_without_mask() {
        let layer = NoiseLayer::new(3, 0.5);
        let x = Evaluation::constant(TensorList::single(Tensor::vector(vec![1.0, 2.0, 3.0])));
        let y = layer.eval(&[x]).unwrap();
        assert_eq!(y.data()[0].data(), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_reseed_is_deterministic() {
        let mut a = NoiseLayer::new(16, 0.5);
        let mut b = NoiseLayer::new(16, 0.5);
        assert!(a.reseed(3));
        assert!(b.reseed(3));
        assert_eq!(a.mask(), b.mask());
        a.clear_noise();
        assert!(a.mask().is_none());
    }

    #[test]
    fn test_mask_values() {
        let mut layer = NoiseLayer::new(32, 0.25);
        layer.reseed(11);
        let mask = layer.mask().unwrap();
        assert!(mask.data().iter().all(|&m| m == 0.0 || m == 4.0));
    }
}
