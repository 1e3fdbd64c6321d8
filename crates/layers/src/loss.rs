//! Mean squared error between a prediction and a target.

use converge_core::{
    expect_inputs, CoreError, Evaluation, Layer, LayerHeader, Param, Tensor, TensorList,
};

/// Two inputs `(prediction, target)`; one scalar `mean((p - t)²)` per row.
///
/// Both inputs receive gradient when alive, so the layer can be checked
/// against either side.
#[derive(Debug, Clone)]
pub struct MeanSqLoss {
    header: LayerHeader,
}

impl MeanSqLoss {
    pub fn new() -> Self {
        Self {
            header: LayerHeader::new("mean_sq_loss"),
        }
    }
}

impl Default for MeanSqLoss {
    fn default() -> Self {
        Self::new()
    }
}

impl Layer for MeanSqLoss {
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
        expect_inputs(inputs, 2)?;
        let prediction = inputs[0].clone();
        let target = inputs[1].clone();
        if prediction.data().len() != target.data().len() {
            return Err(CoreError::BatchLength {
                expected: prediction.data().len(),
                got: target.data().len(),
            });
        }

        let residuals = prediction
            .data()
            .iter()
            .zip(target.data().iter())
            .map(|(p, t)| p.minus(t))
            .collect::<Result<Vec<_>, _>>()?;
        let out = residuals
            .iter()
            .map(|r| Tensor::scalar(r.dot(r).unwrap_or(f64::NAN) / r.len().max(1) as f64))
            .collect();

        Ok(Evaluation::new(TensorList::new(out)?, move |deltas, grad| {
            let d_pred = residuals
                .iter()
                .zip(grad.iter())
                .map(|(r, g)| r.scale(2.0 * g.get(0) / r.len().max(1) as f64))
                .collect::<Vec<_>>();
            if target.is_alive() {
                let d_target = d_pred.iter().map(|d| d.scale(-1.0)).collect();
                target.accumulate(deltas, &TensorList::new(d_target)?)?;
            }
            if prediction.is_alive() {
                prediction.accumulate(deltas, &TensorList::new(d_pred)?)?;
            }
            Ok(())
        }))
    }

    fn boxed_clone(&self) -> Box<dyn Layer> {
        Box::new(self.clone())
    }
}
