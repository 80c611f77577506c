use std::{
    error::Error,
    fmt::{self, Display},
};

/// The result type used in the entire machine learning module.
pub type Result<T> = std::result::Result<T, MlErr>;

/// The machine learning module's error type.
#[derive(Debug)]
pub enum MlErr {
    /// Malformed geometry reaching a layer, the encoder or a loss function.
    Shape {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    /// A joint sequence does not fit in the encoder.
    SequenceTooLong {
        got: usize,
        max: usize,
    },
    UnknownToken {
        id: u32,
        vocab: usize,
    },
    InvalidLabel {
        what: &'static str,
        value: f32,
    },
    /// A backward pass was requested without a matching forward pass.
    MissingForward {
        what: &'static str,
    },
    InvalidInput(&'static str),
    Weights(String),
}

impl Display for MlErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MlErr::Shape {
                what,
                got,
                expected,
            } => write!(f, "shape mismatch for {what}: got {got}, expected {expected}"),
            MlErr::SequenceTooLong { got, max } => write!(
                f,
                "sequence of length {got} exceeds the encoder's maximum length of {max}"
            ),
            MlErr::UnknownToken { id, vocab } => {
                write!(f, "token id {id} is outside the vocabulary of size {vocab}")
            }
            MlErr::InvalidLabel { what, value } => write!(f, "invalid {what} label: {value}"),
            MlErr::MissingForward { what } => {
                write!(f, "backward called on {what} without a previous forward pass")
            }
            MlErr::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            MlErr::Weights(msg) => write!(f, "cannot load weights: {msg}"),
        }
    }
}

impl Error for MlErr {}

impl From<ndarray::ShapeError> for MlErr {
    fn from(_: ndarray::ShapeError) -> Self {
        MlErr::InvalidInput("raw buffer does not match the requested array shape")
    }
}
