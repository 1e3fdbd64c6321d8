//! Additive bias: `y = x + b`.

use converge_core::{
    expect_dims, expect_inputs, CoreError, Evaluation, Layer, LayerHeader, Param, Tensor,
    TensorList,
};

/// `y = x + b`, with `b` shaped like one input item.
#[derive(Debug, Clone)]
pub struct Bias {
    header: LayerHeader,
    bias: Param,
}

impl Bias {
    pub fn new(dims: Vec<usize>) -> Self {
        Self::from_values(Tensor::zeros(dims))
    }

    pub fn from_values(bias: Tensor) -> Self {
        Self {
            header: LayerHeader::new(format!("bias_{}", bias.shape())),
            bias: Param::new("bias", bias),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.header.name = name.into();
        self
    }

    pub fn bias(&self) -> &Param {
        &self.bias
    }
}

impl Layer for Bias {
    fn header(&self) -> &LayerHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut LayerHeader {
        &mut self.header
    }

    fn state(&self) -> Vec<&Param> {
        vec![&self.bias]
    }

    fn state_mut(&mut self) -> Vec<&mut Param> {
        vec![&mut self.bias]
    }

    fn eval(&self, inputs: &[Evaluation]) -> Result<Evaluation, CoreError> {
        self.assert_alive()?;
        expect_inputs(inputs, 1)?;
        let input = inputs[0].clone();
        expect_dims(&input, self.bias.value.dims())?;

        let b = &self.bias.value;
        let out = input
            .data()
            .iter()
            .map(|x| x.add(b))
            .collect::<Result<Vec<_>, _>>()?;
        let frozen = self.is_frozen();
        let slot = self.bias.id;
        let len = b.len();

        Ok(Evaluation::new(TensorList::new(out)?, move |deltas, grad| {
            if !frozen {
                let mut db = vec![0.0; len];
                for g in grad {
                    for (d, v) in db.iter_mut().zip(g.data()) {
                        *d += v;
                    }
                }
                deltas.accumulate(slot, &db)?;
            }
            if input.is_alive() {
                input.accumulate(deltas, grad)?;
            }
            Ok(())
        }))
    }

    fn boxed_clone(&self) -> Box<dyn Layer> {
        Box::new(self.clone())
    }
}
