//! Candle and depth query service
//!
//! Sits between a request layer (HTTP, RPC, ...) and the aggregators:
//! resolves request defaults, fetches ticks from a [`TickSource`], sorts them
//! the way each aggregator requires, aggregates, and builds the response
//! envelopes chart clients consume.
//!
//! Every request is an independent unit of work with no state shared across
//! requests except the metrics counters. The `*_async` variants run the
//! aggregation on the tokio blocking pool.

use std::sync::Arc;
use std::time::Instant;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, info_span, warn};
use types::errors::AggregationError;
use uuid::Uuid;

use crate::candles::{aggregate_candles, Candle};
use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigError, ServiceConfig};
use crate::depth::{DepthAggregator, DepthChart};
use crate::metrics::AggregationMetrics;
use crate::source::{OrderFilter, SourceError, TickSource, TradeFilter};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("no {0}")]
    MissingParameter(&'static str),

    #[error("no data")]
    NoData,

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Aggregation(#[from] AggregationError),

    #[error("aggregation task failed: {0}")]
    Join(String),
}

/// Candle request. Omitted fields take [`ServiceConfig`] defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandleQuery {
    pub nft_address: Option<String>,
    pub token_id: Option<String>,
    pub from: Option<i64>,
    pub to: Option<i64>,
    /// Candle width in seconds.
    pub interval: Option<i64>,
}

/// Depth request. Omitted fields take [`ServiceConfig`] defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepthQuery {
    pub nft_address: Option<String>,
    pub token_id: Option<String>,
    pub from: Option<i64>,
    pub to: Option<i64>,
    /// Only used to derive the default `from`.
    pub interval: Option<i64>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub step: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub min: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub max: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandleResponse {
    pub success: bool,
    pub contract_address: Option<String>,
    pub nft_address: String,
    pub token_id: String,
    pub interval: i64,
    pub from: i64,
    pub to: i64,
    pub ohlc: Vec<Candle>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepthResponse {
    pub success: bool,
    pub contract_address: Option<String>,
    pub nft_address: String,
    pub token_id: String,
    pub from: i64,
    #[serde(with = "rust_decimal::serde::float")]
    pub step: Decimal,
    pub to: i64,
    pub data: DepthChart,
}

/// Failure envelope: `{"success": false, "message": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
}

impl From<&ServiceError> for ErrorResponse {
    fn from(err: &ServiceError) -> Self {
        Self {
            success: false,
            message: err.to_string(),
        }
    }
}

/// Render a service result as the JSON body returned to clients.
pub fn envelope<T: Serialize>(result: &Result<T, ServiceError>) -> serde_json::Value {
    let rendered = match result {
        Ok(response) => serde_json::to_value(response),
        Err(err) => serde_json::to_value(ErrorResponse::from(err)),
    };
    rendered.unwrap_or_else(|e| {
        serde_json::json!({ "success": false, "message": e.to_string() })
    })
}

pub struct MarketDataService<S, C = SystemClock> {
    source: S,
    clock: C,
    config: ServiceConfig,
    metrics: Arc<AggregationMetrics>,
}

impl<S: TickSource> MarketDataService<S, SystemClock> {
    pub fn new(source: S, config: ServiceConfig) -> Result<Self, ConfigError> {
        Self::with_clock(source, SystemClock, config)
    }
}

impl<S: TickSource, C: Clock> MarketDataService<S, C> {
    pub fn with_clock(source: S, clock: C, config: ServiceConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        info!(
            default_interval = config.default_interval,
            default_step = %config.default_step,
            max_bins = config.max_bins,
            "MarketDataService initialized"
        );
        let metrics = Arc::new(AggregationMetrics::new(config.latency_samples));
        Ok(Self {
            source,
            clock,
            config,
            metrics,
        })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<AggregationMetrics> {
        &self.metrics
    }

    /// Executed trades of a collection as OHLCV candles.
    pub fn candles(&self, query: &CandleQuery) -> Result<CandleResponse, ServiceError> {
        self.metrics.record_candle_request();
        let nft_address = required_address(&query.nft_address)?;
        let span = info_span!("candle_request", request_id = %Uuid::now_v7(), nft_address);
        let _enter = span.enter();

        let now = self.clock.now();
        let interval = query.interval.unwrap_or(self.config.default_interval);
        if interval <= 0 {
            return Err(self.reject(AggregationError::invalid(format!(
                "interval must be positive, got {}",
                interval
            ))));
        }
        let from = query
            .from
            .unwrap_or_else(|| self.config.default_from(now, interval));
        let to = query.to.unwrap_or(self.config.default_to);

        let filter = TradeFilter {
            nft_address: nft_address.to_string(),
            token_id: query.token_id.clone().filter(|id| !id.is_empty()),
            from,
            to,
        };
        let mut batch = self.source.trades(&filter)?;
        if batch.is_empty() {
            self.metrics.record_empty_result();
            debug!(from, to, "No trades in range");
            return Err(ServiceError::NoData);
        }
        batch.ticks.sort_by_key(|tick| tick.time);

        let started = Instant::now();
        let ohlc = aggregate_candles(&batch.ticks, interval, now).map_err(|e| self.reject(e))?;
        self.metrics
            .record_candles(ohlc.len(), started.elapsed().as_nanos() as u64);

        info!(
            ticks = batch.ticks.len(),
            candles = ohlc.len(),
            interval,
            "Candle request served"
        );

        Ok(CandleResponse {
            success: true,
            contract_address: batch.contract_address,
            nft_address: batch.nft_address,
            token_id: query.token_id.clone().unwrap_or_default(),
            interval,
            from,
            to,
            ohlc,
        })
    }

    /// Open orders of a collection as depth bins.
    pub fn depth(&self, query: &DepthQuery) -> Result<DepthResponse, ServiceError> {
        self.metrics.record_depth_request();
        let nft_address = required_address(&query.nft_address)?;
        let span = info_span!("depth_request", request_id = %Uuid::now_v7(), nft_address);
        let _enter = span.enter();

        let now = self.clock.now();
        let interval = query.interval.unwrap_or(self.config.default_interval);
        let from = query
            .from
            .unwrap_or_else(|| self.config.default_from(now, interval));
        let to = query.to.unwrap_or(self.config.default_to);
        let step = query.step.unwrap_or(self.config.default_step);

        let aggregator = DepthAggregator::new(step)
            .map_err(|e| self.reject(e))?
            .with_max_bins(self.config.max_bins);

        let filter = OrderFilter {
            nft_address: nft_address.to_string(),
            token_id: query.token_id.clone().filter(|id| !id.is_empty()),
            from,
            to,
            min_price: query.min.unwrap_or(self.config.default_min_price),
            max_price: query.max.unwrap_or(self.config.default_max_price),
        };
        let mut batch = self.source.open_orders(&filter)?;
        if batch.is_empty() {
            self.metrics.record_empty_result();
            debug!(from, to, "No open orders in range");
            return Err(ServiceError::NoData);
        }
        batch.ticks.sort_by_key(|tick| tick.price);

        let started = Instant::now();
        let data = aggregator
            .aggregate(&batch.ticks)
            .map_err(|e| self.reject(e))?;
        self.metrics
            .record_depth(data.len(), started.elapsed().as_nanos() as u64);

        info!(
            ticks = batch.ticks.len(),
            bins = data.len(),
            step = %step,
            "Depth request served"
        );

        Ok(DepthResponse {
            success: true,
            contract_address: batch.contract_address,
            nft_address: batch.nft_address,
            token_id: query.token_id.clone().unwrap_or_default(),
            from,
            step,
            to,
            data,
        })
    }

    fn reject(&self, err: AggregationError) -> ServiceError {
        self.metrics.record_invalid_input();
        warn!(error = %err, "Aggregation rejected input");
        ServiceError::Aggregation(err)
    }
}

impl<S, C> MarketDataService<S, C>
where
    S: TickSource + 'static,
    C: Clock + 'static,
{
    /// [`Self::candles`] on the blocking pool.
    pub async fn candles_async(self: Arc<Self>, query: CandleQuery) -> Result<CandleResponse, ServiceError> {
        tokio::task::spawn_blocking(move || self.candles(&query))
            .await
            .map_err(|e| ServiceError::Join(e.to_string()))?
    }

    /// [`Self::depth`] on the blocking pool.
    pub async fn depth_async(self: Arc<Self>, query: DepthQuery) -> Result<DepthResponse, ServiceError> {
        tokio::task::spawn_blocking(move || self.depth(&query))
            .await
            .map_err(|e| ServiceError::Join(e.to_string()))?
    }
}

fn required_address(address: &Option<String>) -> Result<&str, ServiceError> {
    match address.as_deref() {
        Some(address) if !address.is_empty() => Ok(address),
        _ => Err(ServiceError::MissingParameter("nftAddress")),
    }
}
