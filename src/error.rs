use std::fmt;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScoutError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV Parsing Error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON Parsing Error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Data Validation Error: {0}")]
    Validation(String),

    #[error("Insufficient Data: {0}")]
    InsufficientData(String),

    #[error("Model Error: {0}")]
    Model(#[from] linfa_linear::LinearError<f64>),

    #[error("Plot Error: {0}")]
    Plot(String),
}

pub type ScoutResult<T> = Result<T, ScoutError>;

/// A record that cannot be turned into a feature vector.
///
/// Rejections are per player and never abort the batch.
#[derive(Debug, Clone, PartialEq)]
pub struct MissingFeature {
    pub player: String,
    pub feature: &'static str,
}

impl fmt::Display for MissingFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "player '{}' is missing required feature '{}'",
            self.player, self.feature
        )
    }
}

impl std::error::Error for MissingFeature {}
