//! Order-book depth aggregation
//!
//! Buckets open orders into fixed-width price bins and builds the cumulative
//! depth curve used by the depth-of-market chart.
//!
//! Bins start at the first tick's price and are `step` wide, up to the bin
//! containing the last tick's price. Callers sort ticks ascending by price;
//! the bounds are read from the ends of the slice, not searched for. A tick
//! whose bin falls outside the range is clamped into the nearest bin.
//!
//! `depth_sum[i]` totals `depths[0..=i]`, lowest price first.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use types::errors::AggregationError;
use types::tick::Tick;

/// Default ceiling on the number of bins one aggregation may allocate.
pub const DEFAULT_MAX_BINS: usize = 1_000_000;

/// One fixed-width price bin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepthBin {
    /// Lower bound of the bin.
    #[serde(with = "rust_decimal::serde::float")]
    pub price_start: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub quantity: Decimal,
    /// Sum of price × quantity.
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
}

impl DepthBin {
    fn empty(price_start: Decimal) -> Self {
        Self {
            price_start,
            quantity: Decimal::ZERO,
            amount: Decimal::ZERO,
        }
    }
}

/// Per-bin totals and their running cumulative totals.
///
/// Both vectors have the same length and the same `price_start` per index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepthChart {
    pub depths: Vec<DepthBin>,
    pub depth_sum: Vec<DepthBin>,
}

impl DepthChart {
    /// Number of bins.
    pub fn len(&self) -> usize {
        self.depths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.depths.is_empty()
    }

    /// Quantity across all bins.
    pub fn total_quantity(&self) -> Decimal {
        self.depth_sum
            .last()
            .map(|bin| bin.quantity)
            .unwrap_or(Decimal::ZERO)
    }

    /// Amount across all bins.
    pub fn total_amount(&self) -> Decimal {
        self.depth_sum
            .last()
            .map(|bin| bin.amount)
            .unwrap_or(Decimal::ZERO)
    }
}

/// Depth aggregation at a fixed price step.
#[derive(Debug, Clone, Copy)]
pub struct DepthAggregator {
    step: Decimal,
    max_bins: usize,
}

impl DepthAggregator {
    pub fn new(step: Decimal) -> Result<Self, AggregationError> {
        validate_step(step)?;
        Ok(Self {
            step,
            max_bins: DEFAULT_MAX_BINS,
        })
    }

    /// Override the bin ceiling.
    pub fn with_max_bins(mut self, max_bins: usize) -> Self {
        self.max_bins = max_bins.max(1);
        self
    }

    pub fn step(&self) -> Decimal {
        self.step
    }

    pub fn max_bins(&self) -> usize {
        self.max_bins
    }

    /// Aggregate price-sorted ticks into depth bins.
    pub fn aggregate(&self, ticks: &[Tick]) -> Result<DepthChart, AggregationError> {
        let (first, last) = match (ticks.first(), ticks.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => {
                warn!("Rejecting depth aggregation of empty tick sequence");
                return Err(AggregationError::invalid("empty tick sequence"));
            }
        };

        let min_price = first.price.as_decimal();
        let max_price = last.price.as_decimal();
        let bin_count = self.bin_count(min_price, max_price)?;

        let mut depths = Vec::with_capacity(bin_count);
        for i in 0..bin_count {
            let price_start = Decimal::from(i)
                .checked_mul(self.step)
                .and_then(|offset| min_price.checked_add(offset))
                .ok_or_else(|| AggregationError::invalid(format!("price overflow at bin {}", i)))?;
            depths.push(DepthBin::empty(price_start));
        }

        for tick in ticks {
            let idx = self.bin_index(tick, min_price, bin_count);
            let amount = tick.amount().ok_or_else(|| {
                AggregationError::invalid(format!(
                    "amount overflow: {} x {}",
                    tick.price, tick.quantity
                ))
            })?;
            let bin = &mut depths[idx];
            bin.quantity = checked_sum(bin.quantity, tick.quantity.as_decimal(), idx)?;
            bin.amount = checked_sum(bin.amount, amount, idx)?;
        }

        let mut depth_sum = Vec::with_capacity(bin_count);
        let mut running = DepthBin::empty(Decimal::ZERO);
        for (idx, bin) in depths.iter().enumerate() {
            running.quantity = checked_sum(running.quantity, bin.quantity, idx)?;
            running.amount = checked_sum(running.amount, bin.amount, idx)?;
            depth_sum.push(DepthBin {
                price_start: bin.price_start,
                ..running
            });
        }

        debug!(
            ticks = ticks.len(),
            step = %self.step,
            min_price = %min_price,
            max_price = %max_price,
            bins = bin_count,
            "Depth aggregated"
        );

        Ok(DepthChart { depths, depth_sum })
    }

    /// `floor((max - min) / step) + 1`, at least one bin.
    fn bin_count(&self, min_price: Decimal, max_price: Decimal) -> Result<usize, AggregationError> {
        if max_price < min_price {
            warn!(
                min_price = %min_price,
                max_price = %max_price,
                "Depth ticks not sorted by price, collapsing to one bin"
            );
            return Ok(1);
        }

        let span = (max_price - min_price)
            .checked_div(self.step)
            .ok_or_else(|| AggregationError::invalid("price span overflow"))?
            .floor();

        let count = span
            .to_usize()
            .and_then(|n| n.checked_add(1))
            .filter(|n| *n <= self.max_bins);

        count.ok_or_else(|| {
            warn!(
                min_price = %min_price,
                max_price = %max_price,
                step = %self.step,
                max_bins = self.max_bins,
                "Depth bin count exceeds ceiling"
            );
            AggregationError::invalid(format!(
                "price range {}..{} at step {} exceeds {} bins",
                min_price, max_price, self.step, self.max_bins
            ))
        })
    }

    /// `floor((price - min) / step)`, clamped into `[0, bin_count)`.
    fn bin_index(&self, tick: &Tick, min_price: Decimal, bin_count: usize) -> usize {
        let last = bin_count - 1;
        let offset = tick.price.as_decimal() - min_price;
        if offset.is_sign_negative() {
            return 0;
        }
        offset
            .checked_div(self.step)
            .and_then(|q| q.floor().to_usize())
            .map_or(last, |idx| idx.min(last))
    }
}

fn validate_step(step: Decimal) -> Result<(), AggregationError> {
    if step <= Decimal::ZERO {
        warn!(step = %step, "Rejecting non-positive depth step");
        return Err(AggregationError::invalid(format!(
            "step must be positive, got {}",
            step
        )));
    }
    Ok(())
}

fn checked_sum(acc: Decimal, value: Decimal, bin: usize) -> Result<Decimal, AggregationError> {
    acc.checked_add(value)
        .ok_or_else(|| AggregationError::invalid(format!("sum overflow in bin {}", bin)))
}

/// Aggregate price-sorted ticks into `step`-wide bins.
///
/// Fails with `InvalidInput` when `ticks` is empty, `step <= 0`, or the price
/// range needs more than [`DEFAULT_MAX_BINS`] bins.
pub fn aggregate_depth(ticks: &[Tick], step: Decimal) -> Result<DepthChart, AggregationError> {
    if ticks.is_empty() {
        warn!("Rejecting depth aggregation of empty tick sequence");
        return Err(AggregationError::invalid("empty tick sequence"));
    }
    DepthAggregator::new(step)?.aggregate(ticks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use types::numeric::{Price, Quantity};

    fn order(price: &str, qty: &str) -> Tick {
        Tick::order(
            Price::from_str(price).unwrap(),
            Quantity::from_str(qty).unwrap(),
        )
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str_exact(s).unwrap()
    }

    fn bin(price: &str, qty: &str, amount: &str) -> DepthBin {
        DepthBin {
            price_start: dec(price),
            quantity: dec(qty),
            amount: dec(amount),
        }
    }

    #[test]
    fn test_two_bin_example() {
        let ticks = vec![order("100", "1"), order("105", "2"), order("115", "1")];
        let chart = aggregate_depth(&ticks, dec("10")).unwrap();

        assert_eq!(chart.depths, vec![bin("100", "3", "310"), bin("110", "1", "115")]);
        assert_eq!(chart.depth_sum, vec![bin("100", "3", "310"), bin("110", "4", "425")]);
        assert_eq!(chart.total_quantity(), dec("4"));
        assert_eq!(chart.total_amount(), dec("425"));
    }

    #[test]
    fn test_single_price_single_bin() {
        let ticks = vec![order("50", "1"), order("50", "4")];
        let chart = aggregate_depth(&ticks, dec("10")).unwrap();

        assert_eq!(chart.len(), 1);
        assert_eq!(chart.depths[0], bin("50", "5", "250"));
        assert_eq!(chart.depth_sum[0], chart.depths[0]);
    }

    #[test]
    fn test_max_price_on_bin_boundary_gets_own_bin() {
        let ticks = vec![order("100", "1"), order("120", "1")];
        let chart = aggregate_depth(&ticks, dec("10")).unwrap();

        assert_eq!(chart.len(), 3);
        assert_eq!(chart.depths[1], bin("110", "0", "0"));
        assert_eq!(chart.depths[2], bin("120", "1", "120"));
        assert_eq!(chart.depth_sum[1], bin("110", "1", "100"));
    }

    #[test]
    fn test_fractional_step() {
        let ticks = vec![order("0.1", "1"), order("0.25", "2"), order("0.3", "1")];
        let chart = aggregate_depth(&ticks, dec("0.1")).unwrap();

        assert_eq!(chart.len(), 3);
        assert_eq!(chart.depths[1].price_start, dec("0.2"));
        assert_eq!(chart.depths[1].quantity, dec("2"));
        assert_eq!(chart.depths[2].quantity, dec("1"));
    }

    #[test]
    fn test_unsorted_ticks_are_clamped() {
        // Last price below first: one bin, nothing lost
        let ticks = vec![order("120", "1"), order("90", "2"), order("100", "3")];
        let chart = aggregate_depth(&ticks, dec("10")).unwrap();

        assert_eq!(chart.len(), 1);
        assert_eq!(chart.depths[0].quantity, dec("6"));
    }

    #[test]
    fn test_tick_above_last_price_clamped_to_last_bin() {
        let ticks = vec![order("100", "1"), order("200", "1"), order("110", "1")];
        let chart = aggregate_depth(&ticks, dec("10")).unwrap();

        assert_eq!(chart.len(), 2);
        assert_eq!(chart.depths[1].quantity, dec("2"));
        assert_eq!(chart.total_quantity(), dec("3"));
    }

    #[test]
    fn test_empty_ticks_rejected() {
        assert!(matches!(
            aggregate_depth(&[], dec("10")),
            Err(AggregationError::InvalidInput(_))
        ));
        let agg = DepthAggregator::new(dec("10")).unwrap();
        assert!(agg.aggregate(&[]).is_err());
    }

    #[test]
    fn test_non_positive_step_rejected() {
        let ticks = vec![order("1", "1")];
        assert!(aggregate_depth(&ticks, Decimal::ZERO).is_err());
        assert!(aggregate_depth(&ticks, dec("-1")).is_err());
        assert!(DepthAggregator::new(Decimal::ZERO).is_err());
    }

    #[test]
    fn test_bin_ceiling() {
        let ticks = vec![order("0", "1"), order("1000", "1")];
        let agg = DepthAggregator::new(dec("1")).unwrap().with_max_bins(100);

        assert_eq!(agg.max_bins(), 100);
        assert!(agg.aggregate(&ticks).is_err());

        let agg = agg.with_max_bins(1001);
        assert_eq!(agg.aggregate(&ticks).unwrap().len(), 1001);
    }

    #[test]
    fn test_cumulative_is_non_decreasing() {
        let ticks = vec![
            order("10", "0"),
            order("12", "1"),
            order("35", "0"),
            order("41", "2"),
            order("77", "5"),
        ];
        let chart = aggregate_depth(&ticks, dec("5")).unwrap();

        assert!(chart
            .depth_sum
            .windows(2)
            .all(|w| w[0].quantity <= w[1].quantity && w[0].amount <= w[1].amount));
        assert_eq!(chart.total_quantity(), dec("8"));
    }

    #[test]
    fn test_depth_chart_serialization() {
        let ticks = vec![order("100", "1"), order("115", "1")];
        let chart = aggregate_depth(&ticks, dec("10")).unwrap();
        let json = serde_json::to_value(&chart).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "depths": [
                    {"priceStart": 100.0, "quantity": 1.0, "amount": 100.0},
                    {"priceStart": 110.0, "quantity": 1.0, "amount": 115.0}
                ],
                "depthSum": [
                    {"priceStart": 100.0, "quantity": 1.0, "amount": 100.0},
                    {"priceStart": 110.0, "quantity": 2.0, "amount": 215.0}
                ]
            })
        );
    }
}
