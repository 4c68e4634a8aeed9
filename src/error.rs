use thiserror::Error;

/// Failure modes raised by the estimator engine.
///
/// All variants are fatal to the call that raised them: the filter's belief
/// is left untouched (mutating methods stage their result in a scratch
/// buffer and only commit once every fallible step has succeeded).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EstimationError {
    #[error("dimension mismatch for {what}: expected {expected}, got {got}")]
    DimensionMismatch {
        expected: usize,
        got: usize,
        what: &'static str,
    },

    #[error("all particles have -inf log-weight after correction")]
    DegenerateWeights,

    #[error("innovation covariance is not positive definite")]
    SingularInnovation,

    #[error("non-finite value produced by {context}")]
    NonFinite { context: &'static str },

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

pub type Result<T> = std::result::Result<T, EstimationError>;
