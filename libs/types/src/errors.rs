//! Error types for market data aggregation
//!
//! Error taxonomy using thiserror

use thiserror::Error;

/// Raised by the candle and depth aggregators.
///
/// Always detectable before any output is produced; never swallowed into an
/// empty or zeroed result.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AggregationError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl AggregationError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidInput(reason.into())
    }
}

/// Price/quantity construction errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NumericError {
    #[error("Invalid price: {0} is negative")]
    NegativePrice(String),

    #[error("Invalid quantity: {0} is negative")]
    NegativeQuantity(String),

    #[error("Cannot parse decimal: {0}")]
    Parse(String),
}
