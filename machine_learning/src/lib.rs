pub mod arch;
mod error;
pub mod initialization;
pub mod metrics;
pub mod optimization;
pub mod params;

pub use error::{MlErr, Result};
