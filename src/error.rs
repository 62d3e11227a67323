//! Error types for surrogate model comparison

use thiserror::Error;

/// Result type alias for comparison operations
pub type Result<T> = std::result::Result<T, SurrogateError>;

/// Main error type for the comparison harness
#[derive(Error, Debug)]
pub enum SurrogateError {
    #[error("Data validation error: {0}")]
    DataValidation(String),

    #[error(
        "Model '{name}' not found. Available models: {} or short names: {}",
        .available.join(", "),
        .short_names.join(", ")
    )]
    UnknownModel {
        name: String,
        available: Vec<String>,
        short_names: Vec<String>,
    },

    #[error("Unknown metric '{name}'. Available metrics: {}", .available.join(", "))]
    UnknownMetric { name: String, available: Vec<String> },

    #[error("Invalid search strategy '{0}', expected one of: grid, random, bayes")]
    InvalidSearchStrategy(String),

    #[error("Invalid parameter '{name}' for {estimator}: {reason}")]
    InvalidParameter {
        name: String,
        estimator: String,
        reason: String,
    },

    #[error("Metric '{metric}' failed for {model} on fold {fold}: {reason}")]
    MetricComputation {
        model: String,
        metric: String,
        fold: usize,
        reason: String,
    },

    #[error("{model} predicted shape {actual:?} on fold {fold}, expected {expected:?}")]
    ShapeMismatch {
        model: String,
        fold: usize,
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("Training error: {0}")]
    Training(String),

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("{model} failed on fold {fold}: {source}")]
    FoldEvaluation {
        model: String,
        fold: usize,
        #[source]
        source: Box<SurrogateError>,
    },

    #[error("Hyperparameter search failed for {model}: {reason}")]
    Search { model: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("setup() must be run before compare()")]
    NotSetUp,

    #[error("Run cancelled")]
    Cancelled,

    #[error("Data error: {0}")]
    Data(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl SurrogateError {
    /// Whether the error stems from invalid setup rather than a single model's evaluation
    pub fn is_setup_error(&self) -> bool {
        matches!(
            self,
            SurrogateError::DataValidation(_)
                | SurrogateError::UnknownModel { .. }
                | SurrogateError::UnknownMetric { .. }
                | SurrogateError::InvalidSearchStrategy(_)
                | SurrogateError::InvalidParameter { .. }
                | SurrogateError::Config(_)
                | SurrogateError::NotSetUp
        )
    }
}

impl From<polars::error::PolarsError> for SurrogateError {
    fn from(err: polars::error::PolarsError) -> Self {
        SurrogateError::Data(err.to_string())
    }
}

impl From<serde_json::Error> for SurrogateError {
    fn from(err: serde_json::Error) -> Self {
        SurrogateError::Serialization(err.to_string())
    }
}

impl From<ndarray::ShapeError> for SurrogateError {
    fn from(err: ndarray::ShapeError) -> Self {
        SurrogateError::DataValidation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_model_lists_alternatives() {
        let err = SurrogateError::UnknownModel {
            name: "Foo".to_string(),
            available: vec!["RandomForest".to_string(), "GaussianProcess".to_string()],
            short_names: vec!["rf".to_string(), "gp".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("'Foo'"));
        assert!(msg.contains("RandomForest, GaussianProcess"));
        assert!(msg.contains("rf, gp"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: SurrogateError = io_err.into();
        assert!(matches!(err, SurrogateError::Io(_)));
        assert!(!err.is_setup_error());
    }

    #[test]
    fn test_setup_errors() {
        assert!(SurrogateError::DataValidation("x".into()).is_setup_error());
        assert!(SurrogateError::NotSetUp.is_setup_error());
        assert!(!SurrogateError::Training("x".into()).is_setup_error());
    }
}
