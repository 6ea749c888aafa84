use ndarray::{ArrayD, Zip};

use crate::{MlErr, Result};

#[derive(Debug, Clone, Default)]
pub struct Relu {
    x: Option<ArrayD<f32>>,
}

impl Relu {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn forward(&mut self, x: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let y = x.mapv(|v| v.max(0.));
        self.x = Some(x);
        Ok(y)
    }

    pub fn backward(&mut self, mut d: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let x = self
            .x
            .as_ref()
            .ok_or(MlErr::BackwardBeforeForward { layer: "relu" })?;

        if d.shape() != x.shape() {
            return Err(MlErr::InvalidShape {
                layer: "relu",
                got: d.shape().to_vec(),
                expected: "the shape of the last forward input",
            });
        }

        Zip::from(&mut d).and(x).for_each(|d, &x| {
            if x <= 0. {
                *d = 0.;
            }
        });

        Ok(d)
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn passes_only_positive_inputs() {
        let mut relu = Relu::new();

        let y = relu.forward(array![[-1., 0., 2.]].into_dyn()).unwrap();
        assert_eq!(y, array![[0., 0., 2.]].into_dyn());

        let d = relu.backward(array![[5., 5., 5.]].into_dyn()).unwrap();
        assert_eq!(d, array![[0., 0., 5.]].into_dyn());
    }
}
