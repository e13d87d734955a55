//! Error taxonomy for the slotting pipeline.

use thiserror::Error;

/// Errors raised by the analytic stages.
///
/// Structural errors abort a run. Missing metadata or products absent from
/// the similarity index are not errors: those degrade to fallback values.
#[derive(Debug, Error)]
pub enum SlottingError {
    /// A stage was invoked before the stage it depends on.
    #[error("{stage} requires {required} to run first")]
    Precondition {
        stage: &'static str,
        required: &'static str,
    },

    /// Filtering left nothing to work with.
    #[error("no usable data: {0}")]
    EmptyResult(String),

    /// Similarity metric name not recognised.
    #[error("unknown similarity metric '{0}' (expected jaccard, cosine or lift)")]
    InvalidMetric(String),

    /// Linkage name not recognised.
    #[error("unknown linkage '{0}' (expected complete, average or single)")]
    InvalidLinkage(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Product id not present in the similarity index.
    #[error("product {0} not found in similarity matrix")]
    UnknownProduct(String),

    /// A recommendation failed schema validation.
    #[error("invalid recommendation: {0}")]
    InvalidRecommendation(String),

    /// The persistence delegate rejected the recommendations.
    #[error("failed to persist recommendations: {0}")]
    Persistence(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = SlottingError::Precondition {
            stage: "recommend",
            required: "cluster",
        };
        assert_eq!(err.to_string(), "recommend requires cluster to run first");

        let err = SlottingError::InvalidMetric("euclidean".to_string());
        assert!(err.to_string().contains("euclidean"));
    }
}
