use ndarray::{ArrayD, IxDyn};

use crate::{MlErr, Result};

/// Reshapes every sample of a batch, keeping the leading batch axis.
#[derive(Debug, Clone)]
pub struct Reshape {
    sample_shape: Vec<usize>,
    input: Option<IxDyn>,
}

impl Reshape {
    pub fn new(sample_shape: &[usize]) -> Self {
        Self {
            sample_shape: sample_shape.to_vec(),
            input: None,
        }
    }

    pub fn forward(&mut self, x: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let Some(&batch) = x.shape().first() else {
            return Err(MlErr::InvalidShape {
                layer: "reshape",
                got: vec![],
                expected: "a leading batch axis",
            });
        };

        let target: Vec<usize> = std::iter::once(batch)
            .chain(self.sample_shape.iter().copied())
            .collect();

        if target.iter().product::<usize>() != x.len() {
            return Err(MlErr::InvalidShape {
                layer: "reshape",
                got: x.shape().to_vec(),
                expected: "as many elements per sample as the target shape",
            });
        }

        self.input = Some(x.raw_dim());
        Ok(standard(x).into_shape_with_order(IxDyn(&target))?)
    }

    pub fn backward(&mut self, d: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let input = self
            .input
            .clone()
            .ok_or(MlErr::BackwardBeforeForward { layer: "reshape" })?;

        Ok(standard(d).into_shape_with_order(input)?)
    }
}

fn standard(x: ArrayD<f32>) -> ArrayD<f32> {
    if x.is_standard_layout() {
        x
    } else {
        x.as_standard_layout().into_owned()
    }
}

#[cfg(test)]
mod tests {
    use ndarray::Array;

    use super::*;

    #[test]
    fn keeps_the_batch_axis() {
        let mut reshape = Reshape::new(&[1, 2, 3]);
        let x = Array::from_shape_fn((4, 6), |(i, j)| (i * 6 + j) as f32).into_dyn();

        let y = reshape.forward(x.clone()).unwrap();
        assert_eq!(y.shape(), &[4, 1, 2, 3]);
        assert_eq!(y.iter().copied().collect::<Vec<_>>(), x.iter().copied().collect::<Vec<_>>());

        let back = reshape.backward(y).unwrap();
        assert_eq!(back, x);
    }

    #[test]
    fn rejects_the_wrong_amount_of_elements() {
        let mut reshape = Reshape::new(&[5]);
        assert!(reshape.forward(Array::zeros((2, 4)).into_dyn()).is_err());
    }
}
