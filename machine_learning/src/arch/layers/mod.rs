mod avg_pool;
mod batch_norm;
mod conv;
mod dense;
mod layer;
mod relu;
mod reshape;
mod resize;
mod shape;
mod sigmoid;

pub use avg_pool::AvgPool;
pub use batch_norm::BatchNorm;
pub use conv::Conv2d;
pub use dense::Dense;
pub use layer::Layer;
pub use relu::Relu;
pub use reshape::Reshape;
pub use resize::Resize;
pub use sigmoid::Sigmoid;
