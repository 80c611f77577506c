pub mod checkpoint;
pub mod config;
pub mod data;
mod error;
pub mod evaluation;
pub mod observer;
pub mod predictions;
pub mod rng;
pub mod schedule;
pub mod task;
pub mod trainer;

pub use error::{Result, TrainErr};
