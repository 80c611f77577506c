mod bce;
mod cross_entropy;
mod loss_fn;
mod mse;

pub use bce::BceWithLogits;
pub use cross_entropy::CrossEntropy;
pub use loss_fn::LossFn;
pub use mse::Mse;
