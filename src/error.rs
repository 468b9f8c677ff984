//! Error types for risk and factor analytics

use thiserror::Error;

/// Errors that can occur in risk calculations
#[derive(Error, Debug)]
pub enum RiskError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Invalid confidence level: {0} (must be between 0 and 1)")]
    InvalidConfidenceLevel(f64),

    #[error("Invalid weights: {0}")]
    InvalidWeights(String),

    #[error("Unsupported method {method} for {operation}")]
    UnsupportedMethod { method: String, operation: String },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("No data available: {0}")]
    NoData(String),

    #[error("No overlapping dates between {0} and {1}")]
    NoOverlap(String, String),

    #[error("GARCH volatility backend not available (build with the `garch` feature)")]
    GarchUnavailable,

    #[error("Calculation error: {0}")]
    CalculationError(String),

    #[error("Matrix operation failed: {0}")]
    MatrixError(String),
}

pub type Result<T> = std::result::Result<T, RiskError>;
