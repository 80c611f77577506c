pub mod activations;
mod encoder;
mod heads;
pub mod layers;
pub mod loss;
mod multitask;
mod pair;
pub mod pooling;

pub use encoder::Encoder;
pub use heads::{Head, HeadKind};
pub use multitask::{HeadsConfig, MultitaskModel, TrainMode};
pub use pair::PairEncoder;
pub use pooling::PoolingEncoder;
