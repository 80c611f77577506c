mod dense;
mod dropout;

pub use dense::Dense;
pub use dropout::Dropout;
