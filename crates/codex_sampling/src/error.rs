//! Error types for sampling operations.

use codex_cache::CacheError;

/// Errors that can occur while selecting or downsampling.
#[derive(Debug, thiserror::Error)]
pub enum SamplingError {
    /// A count, option, or input shape is unusable.
    #[error("invalid parameter: {reason}")]
    InvalidParameter {
        /// Description of the problem.
        reason: String,
    },

    /// The caller's cancel token was triggered.
    #[error("sampling cancelled")]
    Cancelled,

    /// The caller's deadline passed before the work finished.
    #[error("sampling deadline exceeded")]
    DeadlineExceeded,

    /// A worker job ended without producing a result.
    #[error("worker job failed: {reason}")]
    JobFailed {
        /// What went wrong.
        reason: String,
    },

    /// A cache operation failed.
    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl SamplingError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        SamplingError::InvalidParameter {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_parameter_display() {
        let err = SamplingError::invalid("No features to span!");
        assert_eq!(err.to_string(), "invalid parameter: No features to span!");
    }

    #[test]
    fn cache_errors_pass_through() {
        let err: SamplingError = CacheError::InvalidCategory {
            name: "log".to_string(),
        }
        .into();
        assert_eq!(err.to_string(), "invalid cache category 'log'");
    }
}
