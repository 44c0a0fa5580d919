//! Query service configuration
//!
//! Defaults applied when a candle or depth request leaves a parameter out,
//! plus the resource ceilings of the aggregators.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from [`ServiceConfig::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("default_interval must be positive, got {0}")]
    NonPositiveInterval(i64),

    #[error("default_step must be positive, got {0}")]
    NonPositiveStep(Decimal),

    #[error("total_bars must be at least 1")]
    ZeroBars,

    #[error("max_bins must be at least 1")]
    ZeroBins,

    #[error("default_min_price {min} exceeds default_max_price {max}")]
    InvertedPriceRange { min: Decimal, max: Decimal },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Candle width in seconds when the request names none.
    pub default_interval: i64,
    /// Number of candle widths looked back when the request has no `from`.
    pub total_bars: i64,
    /// Upper time bound when the request has no `to`.
    pub default_to: i64,
    /// Depth bin width when the request names none.
    pub default_step: Decimal,
    /// Lowest order price considered for depth.
    pub default_min_price: Decimal,
    /// Highest order price considered for depth.
    pub default_max_price: Decimal,
    /// Ceiling on depth bins per request.
    pub max_bins: usize,
    /// Latency samples retained per aggregator.
    pub latency_samples: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            default_interval: 3600,
            total_bars: 50,
            default_to: 3_000_000_000,
            default_step: Decimal::from(10_000),
            default_min_price: Decimal::from(10_000),
            default_max_price: Decimal::from(10_000_000),
            max_bins: crate::depth::DEFAULT_MAX_BINS,
            latency_samples: 1000,
        }
    }
}

impl ServiceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_interval <= 0 {
            return Err(ConfigError::NonPositiveInterval(self.default_interval));
        }
        if self.default_step <= Decimal::ZERO {
            return Err(ConfigError::NonPositiveStep(self.default_step));
        }
        if self.total_bars < 1 {
            return Err(ConfigError::ZeroBars);
        }
        if self.max_bins == 0 {
            return Err(ConfigError::ZeroBins);
        }
        if self.default_min_price > self.default_max_price {
            return Err(ConfigError::InvertedPriceRange {
                min: self.default_min_price,
                max: self.default_max_price,
            });
        }
        Ok(())
    }

    /// Default lower time bound: `total_bars` windows of `interval` before `now`.
    pub fn default_from(&self, now: i64, interval: i64) -> i64 {
        now.saturating_sub(self.total_bars.saturating_mul(interval))
    }
}
