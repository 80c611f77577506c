mod layout;
mod parameters;

pub use layout::ParamLayout;
pub use parameters::Parameters;
