//! Tick: one executed trade or one open order
//!
//! The shared input shape of both aggregators. Trades carry the Unix time
//! (seconds) at which the buyer filled them; open orders carry their listing
//! time, which the depth aggregator ignores.

use chrono::DateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::numeric::{Price, Quantity};

/// Display format of `Tick::format_time`.
pub const TIME_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tick {
    pub price: Price,
    pub quantity: Quantity,
    /// Unix seconds.
    #[serde(default)]
    pub time: i64,
}

impl Tick {
    pub fn new(price: Price, quantity: Quantity, time: i64) -> Self {
        Self {
            price,
            quantity,
            time,
        }
    }

    /// An open order; its time plays no part in depth aggregation.
    pub fn order(price: Price, quantity: Quantity) -> Self {
        Self::new(price, quantity, 0)
    }

    /// Value of the tick (price × quantity), or None on decimal overflow.
    pub fn amount(&self) -> Option<Decimal> {
        self.price.as_decimal().checked_mul(self.quantity.as_decimal())
    }

    /// UTC time rendered as `YYYY/MM/DD HH:mm:ss`.
    ///
    /// Returns None when `time` is outside chrono's representable range.
    pub fn format_time(&self) -> Option<String> {
        DateTime::from_timestamp(self.time, 0).map(|dt| dt.format(TIME_FORMAT).to_string())
    }
}
