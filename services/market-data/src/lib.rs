//! NFT Market Data Aggregation
//!
//! Turns marketplace ticks into chart data:
//! - OHLCV candles at a fixed interval from executed trades
//! - Per-bin and cumulative order-book depth from open orders
//!
//! Both aggregators are pure functions over an in-memory tick slice: no
//! I/O and no shared state, deterministic for equal inputs (candles also take
//! "now" as an input). The query service wraps them with request defaults, a
//! pluggable tick source, metrics and JSON response envelopes.
//!
//! # Architecture
//!
//! ```text
//!   Request layer (HTTP, out of crate)
//!        │  CandleQuery / DepthQuery
//!    ┌───▼──────────────┐      ┌────────────┐
//!    │ MarketDataService│◄─────┤ TickSource │
//!    └───┬──────────┬───┘      └────────────┘
//!        │          │
//!   ┌────▼───┐  ┌───▼───┐
//!   │Candles │  │ Depth │
//!   └────┬───┘  └───┬───┘
//!        │          │
//!    CandleResponse / DepthResponse (JSON)
//! ```

pub mod candles;
pub mod clock;
pub mod config;
pub mod depth;
pub mod metrics;
pub mod service;
pub mod source;

pub use candles::{aggregate_candles, Candle, CandleAggregator, Timeframe, EPOCH};
pub use depth::{aggregate_depth, DepthAggregator, DepthBin, DepthChart};
pub use types::errors::AggregationError;
pub use types::tick::Tick;

// Library version
pub const SERVICE_VERSION: &str = "0.1.0";
