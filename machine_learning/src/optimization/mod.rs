mod adamw;
mod builder;
mod gradient_descent;
mod optimizer;

pub use adamw::AdamW;
pub use builder::{OptimizerBuilder, OptimizerConfig};
pub use gradient_descent::GradientDescent;
pub use optimizer::{Optimizer, OptimizerState};
