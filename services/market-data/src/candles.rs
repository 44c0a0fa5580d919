//! OHLCV Candle Aggregation
//!
//! Buckets executed trades into fixed-width time windows and emits one
//! OHLCV candle per window that saw at least one trade.
//!
//! Window boundaries are anchored to [`EPOCH`]: a window of width `interval`
//! covers `[EPOCH + i*interval, EPOCH + (i+1)*interval)`. A trade exactly on a
//! boundary opens the window starting at that boundary. Only windows that
//! start strictly before "now" are considered; "now" is passed in (or read
//! from an injected [`Clock`]) so results are reproducible.
//!
//! Candles are sparse: windows without trades produce nothing, there is no
//! backfill. `average` is the unweighted mean trade price of the window, not
//! a volume-weighted price.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use types::errors::AggregationError;
use types::tick::Tick;

use crate::clock::{Clock, SystemClock};

/// Anchor of all candle windows: 2021-11-30T16:00:00Z.
///
/// Divisible by every standard [`Timeframe`] up to four hours, so those
/// windows fall on whole UTC minutes/hours. Daily windows open at 16:00 UTC
/// (midnight UTC+8).
pub const EPOCH: i64 = 1_638_288_000;

/// Standard candle timeframes offered to chart clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Timeframe {
    /// 1 minute
    M1,
    /// 5 minutes
    M5,
    /// 15 minutes
    M15,
    /// 30 minutes
    M30,
    /// 1 hour
    H1,
    /// 4 hours
    H4,
    /// 1 day
    D1,
    /// 1 week
    W1,
}

impl Timeframe {
    /// Duration of this timeframe in seconds.
    pub fn seconds(&self) -> i64 {
        match self {
            Timeframe::M1 => 60,
            Timeframe::M5 => 5 * 60,
            Timeframe::M15 => 15 * 60,
            Timeframe::M30 => 30 * 60,
            Timeframe::H1 => 3600,
            Timeframe::H4 => 4 * 3600,
            Timeframe::D1 => 86400,
            Timeframe::W1 => 7 * 86400,
        }
    }

    /// All standard timeframes.
    pub fn all() -> &'static [Timeframe] {
        &[
            Timeframe::M1,
            Timeframe::M5,
            Timeframe::M15,
            Timeframe::M30,
            Timeframe::H1,
            Timeframe::H4,
            Timeframe::D1,
            Timeframe::W1,
        ]
    }

    /// The timeframe whose duration is exactly `seconds`, if any.
    pub fn from_seconds(seconds: i64) -> Option<Timeframe> {
        Self::all().iter().copied().find(|tf| tf.seconds() == seconds)
    }
}

/// A single OHLCV candle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candle {
    #[serde(with = "rust_decimal::serde::float")]
    pub open: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub high: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub low: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub close: Decimal,
    /// Sum of traded quantities.
    #[serde(with = "rust_decimal::serde::float", alias = "volumn")]
    pub volume: Decimal,
    /// Sum of price × quantity.
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    /// Unweighted mean of trade prices.
    #[serde(with = "rust_decimal::serde::float")]
    pub average: Decimal,
    /// Window start, Unix seconds.
    pub time: i64,
}

impl Candle {
    /// Validate candle integrity (OHLCV invariants).
    pub fn is_valid(&self) -> bool {
        self.high >= self.open
            && self.high >= self.close
            && self.high >= self.low
            && self.low <= self.open
            && self.low <= self.close
            && self.volume >= Decimal::ZERO
            && self.amount >= Decimal::ZERO
    }
}

/// Running totals of the window currently being filled.
struct Bucket {
    time: i64,
    open: Decimal,
    high: Decimal,
    low: Decimal,
    close: Decimal,
    volume: Decimal,
    amount: Decimal,
    price_sum: Decimal,
    trade_count: u64,
}

impl Bucket {
    fn open(time: i64, tick: &Tick) -> Result<Self, AggregationError> {
        let price = tick.price.as_decimal();
        Ok(Self {
            time,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: tick.quantity.as_decimal(),
            amount: tick_amount(tick)?,
            price_sum: price,
            trade_count: 1,
        })
    }

    fn push(&mut self, tick: &Tick) -> Result<(), AggregationError> {
        let price = tick.price.as_decimal();
        if price > self.high {
            self.high = price;
        }
        if price < self.low {
            self.low = price;
        }
        self.close = price;
        self.volume = checked_sum(self.volume, tick.quantity.as_decimal(), self.time)?;
        self.amount = checked_sum(self.amount, tick_amount(tick)?, self.time)?;
        self.price_sum = checked_sum(self.price_sum, price, self.time)?;
        self.trade_count += 1;
        Ok(())
    }

    fn finish(self) -> Result<Candle, AggregationError> {
        let average = self
            .price_sum
            .checked_div(Decimal::from(self.trade_count))
            .ok_or_else(|| AggregationError::invalid(format!("average overflow in window {}", self.time)))?;

        Ok(Candle {
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
            amount: self.amount,
            average,
            time: self.time,
        })
    }
}

fn tick_amount(tick: &Tick) -> Result<Decimal, AggregationError> {
    tick.amount().ok_or_else(|| {
        AggregationError::invalid(format!(
            "amount overflow: {} x {} at time {}",
            tick.price, tick.quantity, tick.time
        ))
    })
}

fn checked_sum(acc: Decimal, value: Decimal, window: i64) -> Result<Decimal, AggregationError> {
    acc.checked_add(value)
        .ok_or_else(|| AggregationError::invalid(format!("sum overflow in window {}", window)))
}

/// Start of the window of width `interval` that contains `time`.
pub fn window_start(time: i64, interval: i64) -> Result<i64, AggregationError> {
    if interval <= 0 {
        return Err(AggregationError::invalid(format!(
            "interval must be positive, got {}",
            interval
        )));
    }
    let offset = time
        .checked_sub(EPOCH)
        .ok_or_else(|| AggregationError::invalid(format!("timestamp {} out of range", time)))?;
    time.checked_sub(offset.rem_euclid(interval))
        .ok_or_else(|| AggregationError::invalid(format!("timestamp {} out of range", time)))
}

/// Aggregate time-sorted trades into sparse OHLCV candles.
///
/// Ticks whose window starts at or after `now` are left out. Fails with
/// `InvalidInput` when `ticks` is empty, `interval <= 0`, the ticks are not
/// sorted ascending by time, or a sum leaves the decimal range.
pub fn aggregate_candles(
    ticks: &[Tick],
    interval: i64,
    now: i64,
) -> Result<Vec<Candle>, AggregationError> {
    if ticks.is_empty() {
        warn!("Rejecting candle aggregation of empty tick sequence");
        return Err(AggregationError::invalid("empty tick sequence"));
    }
    if interval <= 0 {
        warn!(interval, "Rejecting non-positive candle interval");
        return Err(AggregationError::invalid(format!(
            "interval must be positive, got {}",
            interval
        )));
    }
    if let Some(pos) = ticks.windows(2).position(|w| w[1].time < w[0].time) {
        warn!(
            index = pos + 1,
            time = ticks[pos + 1].time,
            previous = ticks[pos].time,
            "Ticks not sorted by time"
        );
        return Err(AggregationError::invalid(format!(
            "ticks not sorted by time at index {}",
            pos + 1
        )));
    }

    let mut candles = Vec::new();
    let mut current: Option<Bucket> = None;

    for tick in ticks {
        let start = window_start(tick.time, interval)?;
        // Sorted input: every later tick lands in this window or a later one.
        if start >= now {
            break;
        }

        match current.as_mut() {
            Some(bucket) if bucket.time == start => bucket.push(tick)?,
            _ => {
                if let Some(done) = current.take() {
                    candles.push(done.finish()?);
                }
                current = Some(Bucket::open(start, tick)?);
            }
        }
    }

    if let Some(done) = current {
        candles.push(done.finish()?);
    }

    debug!(
        ticks = ticks.len(),
        interval,
        now,
        candles = candles.len(),
        "Candles aggregated"
    );

    Ok(candles)
}

/// Candle aggregation at a fixed interval against an injected clock.
#[derive(Debug, Clone)]
pub struct CandleAggregator<C = SystemClock> {
    interval: i64,
    clock: C,
}

impl CandleAggregator<SystemClock> {
    /// Aggregator reading the wall clock.
    pub fn new(interval: i64) -> Result<Self, AggregationError> {
        Self::with_clock(interval, SystemClock)
    }

    pub fn for_timeframe(timeframe: Timeframe) -> Self {
        Self {
            interval: timeframe.seconds(),
            clock: SystemClock,
        }
    }
}

impl<C: Clock> CandleAggregator<C> {
    pub fn with_clock(interval: i64, clock: C) -> Result<Self, AggregationError> {
        if interval <= 0 {
            return Err(AggregationError::invalid(format!(
                "interval must be positive, got {}",
                interval
            )));
        }
        Ok(Self { interval, clock })
    }

    pub fn interval(&self) -> i64 {
        self.interval
    }

    /// Aggregate `ticks` using the clock's current time as "now".
    pub fn aggregate(&self, ticks: &[Tick]) -> Result<Vec<Candle>, AggregationError> {
        aggregate_candles(ticks, self.interval, self.clock.now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use std::str::FromStr;
    use types::numeric::{Price, Quantity};

    const NOW: i64 = 1_700_000_000;

    fn tick(price: &str, qty: &str, time: i64) -> Tick {
        Tick::new(
            Price::from_str(price).unwrap(),
            Quantity::from_str(qty).unwrap(),
            time,
        )
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str_exact(s).unwrap()
    }

    #[test]
    fn test_timeframe_seconds() {
        assert_eq!(Timeframe::M1.seconds(), 60);
        assert_eq!(Timeframe::H4.seconds(), 14_400);
        assert_eq!(Timeframe::D1.seconds(), 86_400);
        assert_eq!(Timeframe::from_seconds(1800), Some(Timeframe::M30));
        assert_eq!(Timeframe::from_seconds(7), None);
    }

    #[test]
    fn test_epoch_aligned_to_standard_timeframes() {
        for tf in Timeframe::all().iter().filter(|tf| **tf <= Timeframe::H4) {
            assert_eq!(EPOCH % tf.seconds(), 0, "{:?}", tf);
        }
        assert_eq!(window_start(EPOCH + 86_399, 86_400).unwrap(), EPOCH);
    }

    #[test]
    fn test_window_start() {
        assert_eq!(window_start(EPOCH, 3600).unwrap(), EPOCH);
        assert_eq!(window_start(EPOCH + 3599, 3600).unwrap(), EPOCH);
        assert_eq!(window_start(EPOCH + 3600, 3600).unwrap(), EPOCH + 3600);
        // Before the anchor
        assert_eq!(window_start(EPOCH - 1, 3600).unwrap(), EPOCH - 3600);
        // Interval not dividing the anchor offset
        assert_eq!(window_start(EPOCH + 10, 7).unwrap(), EPOCH + 7);
        assert!(window_start(EPOCH, 0).is_err());
        assert!(window_start(i64::MIN + EPOCH, i64::MAX).is_err());
        assert_eq!(window_start(i64::MIN + EPOCH, 1).unwrap(), i64::MIN + EPOCH);
    }

    #[test]
    fn test_single_window_example() {
        let ticks = vec![tick("100", "1", 0), tick("110", "2", 30)];
        let candles = aggregate_candles(&ticks, 60, NOW).unwrap();

        assert_eq!(candles.len(), 1);
        let c = &candles[0];
        assert_eq!(c.open, dec("100"));
        assert_eq!(c.high, dec("110"));
        assert_eq!(c.low, dec("100"));
        assert_eq!(c.close, dec("110"));
        assert_eq!(c.volume, dec("3"));
        assert_eq!(c.amount, dec("320"));
        assert_eq!(c.average, dec("105"));
        assert_eq!(c.time, 0);
    }

    #[test]
    fn test_tick_on_boundary_opens_that_window() {
        let ticks = vec![
            tick("10", "1", EPOCH + 59),
            tick("20", "1", EPOCH + 60),
            tick("30", "1", EPOCH + 119),
        ];
        let candles = aggregate_candles(&ticks, 60, NOW).unwrap();

        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].time, EPOCH);
        assert_eq!(candles[0].volume, dec("1"));
        assert_eq!(candles[1].time, EPOCH + 60);
        assert_eq!(candles[1].open, dec("20"));
        assert_eq!(candles[1].close, dec("30"));
    }

    #[test]
    fn test_empty_windows_are_skipped() {
        let ticks = vec![
            tick("10", "1", EPOCH + 5),
            tick("12", "1", EPOCH + 3600 * 5 + 1),
        ];
        let candles = aggregate_candles(&ticks, 3600, NOW).unwrap();

        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].time, EPOCH);
        assert_eq!(candles[1].time, EPOCH + 3600 * 5);
    }

    #[test]
    fn test_windows_at_or_after_now_excluded() {
        let now = EPOCH + 120;
        let ticks = vec![
            tick("10", "1", EPOCH + 10),
            tick("11", "1", EPOCH + 70),
            tick("12", "1", EPOCH + 120),
            tick("13", "1", EPOCH + 500),
        ];
        let candles = aggregate_candles(&ticks, 60, now).unwrap();

        assert_eq!(candles.len(), 2);
        assert_eq!(candles[1].time, EPOCH + 60);
    }

    #[test]
    fn test_in_progress_window_is_included() {
        // Window [EPOCH+60, EPOCH+120) has started but not ended.
        let ticks = vec![tick("10", "1", EPOCH + 61)];
        let candles = aggregate_candles(&ticks, 60, EPOCH + 90).unwrap();
        assert_eq!(candles.len(), 1);
    }

    #[test]
    fn test_all_ticks_in_future_yield_no_candles() {
        let ticks = vec![tick("10", "1", NOW + 100)];
        let candles = aggregate_candles(&ticks, 60, NOW).unwrap();
        assert!(candles.is_empty());
    }

    #[test]
    fn test_average_is_unweighted() {
        let ticks = vec![tick("100", "9", EPOCH), tick("200", "1", EPOCH + 1)];
        let candles = aggregate_candles(&ticks, 60, NOW).unwrap();

        // VWAP would be 110
        assert_eq!(candles[0].average, dec("150"));
        assert_eq!(candles[0].amount, dec("1100"));
    }

    #[test]
    fn test_high_low_tracking() {
        let ticks = vec![
            tick("50", "1", EPOCH),
            tick("51", "2", EPOCH + 1),
            tick("49", "3", EPOCH + 2),
            tick("50.5", "1", EPOCH + 3),
        ];
        let candles = aggregate_candles(&ticks, 60, NOW).unwrap();
        let c = &candles[0];

        assert_eq!(c.open, dec("50"));
        assert_eq!(c.high, dec("51"));
        assert_eq!(c.low, dec("49"));
        assert_eq!(c.close, dec("50.5"));
        assert_eq!(c.volume, dec("7"));
        assert!(c.is_valid());
    }

    #[test]
    fn test_empty_ticks_rejected() {
        let err = aggregate_candles(&[], 60, NOW).unwrap_err();
        assert!(matches!(err, AggregationError::InvalidInput(_)));
    }

    #[test]
    fn test_non_positive_interval_rejected() {
        let ticks = vec![tick("1", "1", EPOCH)];
        assert!(aggregate_candles(&ticks, 0, NOW).is_err());
        assert!(aggregate_candles(&ticks, -60, NOW).is_err());
        assert!(CandleAggregator::new(0).is_err());
    }

    #[test]
    fn test_unsorted_ticks_rejected() {
        let ticks = vec![tick("1", "1", EPOCH + 10), tick("1", "1", EPOCH)];
        match aggregate_candles(&ticks, 60, NOW).unwrap_err() {
            AggregationError::InvalidInput(msg) => assert!(msg.contains("index 1")),
        }
    }

    #[test]
    fn test_amount_overflow_rejected() {
        let ticks = vec![Tick::new(
            Price::new(Decimal::MAX).unwrap(),
            Quantity::from_u64(2),
            EPOCH,
        )];
        assert!(aggregate_candles(&ticks, 60, NOW).is_err());
    }

    #[test]
    fn test_aggregator_uses_clock() {
        let ticks = vec![tick("10", "1", EPOCH + 10), tick("11", "1", EPOCH + 70)];

        let early = CandleAggregator::with_clock(60, FixedClock(EPOCH + 30)).unwrap();
        assert_eq!(early.aggregate(&ticks).unwrap().len(), 1);

        let late = CandleAggregator::with_clock(60, FixedClock(NOW)).unwrap();
        assert_eq!(late.interval(), 60);
        assert_eq!(late.aggregate(&ticks).unwrap().len(), 2);
    }

    #[test]
    fn test_for_timeframe() {
        let agg = CandleAggregator::for_timeframe(Timeframe::H1);
        assert_eq!(agg.interval(), 3600);
        let candles = agg.aggregate(&[tick("1", "1", EPOCH)]).unwrap();
        assert_eq!(candles.len(), 1);
    }

    #[test]
    fn test_candle_integrity_validation() {
        let invalid = Candle {
            open: dec("50000"),
            high: dec("49000"), // High < Open → invalid
            low: dec("48000"),
            close: dec("49500"),
            volume: dec("1"),
            amount: dec("49500"),
            average: dec("49500"),
            time: EPOCH,
        };
        assert!(!invalid.is_valid());
    }

    #[test]
    fn test_candle_serializes_numbers() {
        let ticks = vec![tick("100", "1", 0), tick("110", "2", 30)];
        let candle = aggregate_candles(&ticks, 60, NOW).unwrap().remove(0);

        let json = serde_json::to_value(&candle).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "open": 100.0,
                "high": 110.0,
                "low": 100.0,
                "close": 110.0,
                "volume": 3.0,
                "amount": 320.0,
                "average": 105.0,
                "time": 0
            })
        );
    }

    #[test]
    fn test_candle_accepts_legacy_volume_key() {
        let json = r#"{"open":1,"high":2,"low":1,"close":2,"volumn":4,"amount":6,"average":1.5,"time":60}"#;
        let candle: Candle = serde_json::from_str(json).unwrap();
        assert_eq!(candle.volume, dec("4"));
        assert_eq!(candle.average, dec("1.5"));
    }
}
