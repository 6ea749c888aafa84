use super::ParamGen;

/// Yields one fixed value a bounded amount of times, e.g. zero biases or unit batch norm
/// scales.
#[derive(Debug, Clone)]
pub struct ConstParamGen {
    value: f32,
    left: usize,
}

impl ConstParamGen {
    /// # Arguments
    /// * `value` - The value of every parameter.
    /// * `limit` - How many parameters to yield in total.
    pub fn new(value: f32, limit: usize) -> Self {
        Self { value, left: limit }
    }
}

impl ParamGen for ConstParamGen {
    fn sample(&mut self, n: usize) -> Option<Vec<f32>> {
        if self.left == 0 {
            return None;
        }

        let take = n.min(self.left);
        self.left -= take;
        Some(vec![self.value; take])
    }
}
