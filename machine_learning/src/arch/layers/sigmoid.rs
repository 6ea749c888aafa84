use ndarray::{ArrayD, Zip};

use crate::{MlErr, Result};

#[derive(Debug, Clone, Default)]
pub struct Sigmoid {
    a: Option<ArrayD<f32>>,
}

impl Sigmoid {
    pub fn new() -> Self {
        Self::default()
    }

    /// The logistic function, written to stay finite for large `|z|`.
    pub fn sigmoid(z: f32) -> f32 {
        if z >= 0. {
            1. / (1. + (-z).exp())
        } else {
            let e = z.exp();
            e / (1. + e)
        }
    }

    pub fn forward(&mut self, z: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let a = z.mapv_into(Self::sigmoid);
        self.a = Some(a.clone());
        Ok(a)
    }

    pub fn backward(&mut self, mut d: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let a = self
            .a
            .as_ref()
            .ok_or(MlErr::BackwardBeforeForward { layer: "sigmoid" })?;

        if d.shape() != a.shape() {
            return Err(MlErr::InvalidShape {
                layer: "sigmoid",
                got: d.shape().to_vec(),
                expected: "the shape of the last forward output",
            });
        }

        Zip::from(&mut d).and(a).for_each(|d, &a| *d *= a * (1. - a));
        Ok(d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::check_gradients;

    #[test]
    fn saturates_without_overflow() {
        assert_eq!(Sigmoid::sigmoid(0.), 0.5);
        assert_eq!(Sigmoid::sigmoid(-1000.), 0.);
        assert_eq!(Sigmoid::sigmoid(1000.), 1.);
    }

    #[test]
    fn gradients_match_finite_differences() {
        check_gradients(Sigmoid::new().into(), &[3, 4]);
    }
}
