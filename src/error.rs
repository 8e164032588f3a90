use thiserror::Error;

/// Every failure the core can produce, in one place.
///
/// There is no separate "last error" getter: the `Result` returned by each
/// fallible call *is* the error channel.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("null or empty input: {0}")]
    NullPointer(&'static str),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("singular matrix: {0}")]
    SingularMatrix(String),

    #[error("numerical instability: {0}")]
    NumericalInstability(String),

    #[error("pricing engine failed for {style}/{option_kind}")]
    PricingEngineFailed {
        style: String,
        option_kind: String,
    },

    #[error("constraint violated: {0}")]
    ConstraintViolation(String),

    #[error("not initialized: {0}")]
    NotInitialized(&'static str),
}

pub type Result<T> = std::result::Result<T, GeometryError>;
