use super::ParamGen;

/// A parameter generator that delegates the generation to a chain of parameter generators.
///
/// Each layer of a network contributes one generator per parameter group, so chaining them
/// yields the flat parameter buffer of the whole network in layer order.
pub struct ChainedParamGen {
    param_gens: Vec<Box<dyn ParamGen>>,
    curr: usize,
}

impl ChainedParamGen {
    /// Creates a new `ChainedParamGen` parameter generator.
    ///
    /// # Arguments
    /// * `param_gens` - A vec of potentially different parameter generators.
    pub fn new(param_gens: Vec<Box<dyn ParamGen>>) -> Self {
        Self {
            param_gens,
            curr: 0,
        }
    }
}

impl ParamGen for ChainedParamGen {
    fn sample(&mut self, n: usize) -> Option<Vec<f32>> {
        if self.curr == self.param_gens.len() {
            return None;
        }

        match self.param_gens[self.curr].sample(n) {
            Some(sample) if sample.len() == n => Some(sample),
            Some(mut sample) => {
                self.curr += 1;

                if let Some(next_sample) = self.sample(n - sample.len()) {
                    sample.extend(next_sample);
                }

                Some(sample)
            }
            None => {
                self.curr += 1;
                self.sample(n)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{super::ConstParamGen, *};

    #[test]
    fn empty() {
        let mut param_gen = ChainedParamGen::new(vec![]);
        assert!(param_gen.sample(1).is_none());
    }

    #[test]
    fn exact() {
        let param_gens: Vec<Box<dyn ParamGen>> = vec![
            Box::new(ConstParamGen::new(0., 5)),
            Box::new(ConstParamGen::new(1., 5)),
        ];

        let mut param_gen = ChainedParamGen::new(param_gens);
        let sample = param_gen.sample(10).unwrap();
        let expected: Vec<_> = (0..10).map(|i| if i > 4 { 1. } else { 0. }).collect();

        assert_eq!(sample, expected);
        assert!(param_gen.sample(1).is_none());
    }

    #[test]
    fn skips_empty_generators() {
        let param_gens: Vec<Box<dyn ParamGen>> = vec![
            Box::new(ConstParamGen::new(0., 1)),
            Box::new(ConstParamGen::new(9., 0)),
            Box::new(ConstParamGen::new(1., 3)),
        ];

        let mut param_gen = ChainedParamGen::new(param_gens);

        assert_eq!(param_gen.sample(2).unwrap(), [0., 1.]);
        assert_eq!(param_gen.sample(2).unwrap(), [1., 1.]);
        assert!(param_gen.sample(1).is_none());
    }
}
