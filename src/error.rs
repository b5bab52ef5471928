use enough::StopReason;

use crate::oracle::ComparisonReport;

/// Errors from operator setup, kernel execution and output comparison.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StageError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("unsupported element type: {0}")]
    UnsupportedType(String),

    #[error("missing required argument `{0}`")]
    MissingArgument(&'static str),

    #[error("limit exceeded: {0}")]
    LimitExceeded(String),

    #[error(
        "comparison failed: {} of {} element(s) exceed tolerance {}",
        .0.failures.len(),
        .0.elements.len(),
        .0.tolerance
    )]
    ComparisonFailed(Box<ComparisonReport>),

    #[error("thread pool: {0}")]
    ThreadPool(String),

    #[error("operation cancelled")]
    Cancelled(StopReason),
}

impl From<StopReason> for StageError {
    fn from(r: StopReason) -> Self {
        StageError::Cancelled(r)
    }
}

impl From<rayon::ThreadPoolBuildError> for StageError {
    fn from(e: rayon::ThreadPoolBuildError) -> Self {
        StageError::ThreadPool(e.to_string())
    }
}
