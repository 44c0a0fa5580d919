//! Types library for NFT market data aggregation
//!
//! Shared input shape and numeric types for the candle and depth aggregators,
//! kept in their own crate so request layers can build ticks without pulling
//! in the aggregation engine.
//!
//! # Modules
//! - `numeric`: Fixed-point decimal types (Price, Quantity)
//! - `tick`: Trade / open-order record fed to the aggregators
//! - `errors`: Error taxonomy

// Public modules
pub mod numeric;
pub mod tick;
pub mod errors;

// Library version constant
pub const LIB_VERSION: &str = "1.0.0";

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::numeric::*;
    pub use crate::tick::*;
    pub use crate::errors::*;
}
