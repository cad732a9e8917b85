//! Error types shared by detectors, the semantic service adapter and config loading.

use thiserror::Error;

/// Errors raised inside the detection pipeline.
///
/// None of these reach the caller of [`crate::DetectionEngine::run`]: a failing
/// detector is logged and contributes no matches for that run.
#[derive(Debug, Error)]
pub enum DetectionError {
    /// The semantic analysis service could not be reached or refused the call
    #[error("semantic transport failed: {0}")]
    Transport(String),

    /// The semantic analysis service replied with something that is not JSON
    #[error("invalid semantic response: {0}")]
    InvalidResponse(String),

    /// The reply was JSON but did not conform to the analysis schema
    #[error("semantic response failed schema validation: {}", .0.join("; "))]
    Schema(Vec<String>),

    /// Configuration could not be parsed
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_error_joins_messages() {
        let err = DetectionError::Schema(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(
            err.to_string(),
            "semantic response failed schema validation: a; b"
        );
    }
}
