mod loss_fn;
mod sigmoid_cross_entropy;

pub use loss_fn::LossFn;
pub use sigmoid_cross_entropy::SigmoidCrossEntropy;
