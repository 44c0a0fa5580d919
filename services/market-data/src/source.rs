//! Upstream tick supply
//!
//! The query service does not know where ticks come from. A [`TickSource`]
//! answers the two lookups the aggregation endpoints need: executed trades
//! of a collection, and its open orders within a price band.
//!
//! [`InMemoryTickSource`] keeps marketplace order records in memory and
//! applies the same selection rules a database-backed source must follow:
//! - trades: filled (`filled_at > 0`), not canceled, listed at or after
//!   `from`, filled at or before `to`
//! - open orders: unfilled, not canceled, listed within `[from, to]`, price
//!   within `[min_price, max_price]`

use std::sync::RwLock;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use types::numeric::{Price, Quantity};
use types::tick::Tick;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("tick source unavailable: {0}")]
    Unavailable(String),

    #[error("tick query failed: {0}")]
    Query(String),
}

/// Selects executed trades.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeFilter {
    pub nft_address: String,
    pub token_id: Option<String>,
    pub from: i64,
    pub to: i64,
}

/// Selects open orders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderFilter {
    pub nft_address: String,
    pub token_id: Option<String>,
    pub from: i64,
    pub to: i64,
    pub min_price: Decimal,
    pub max_price: Decimal,
}

/// Ticks of one collection plus the identifiers echoed in responses.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TickBatch {
    /// Marketplace contract the matched orders were placed on.
    pub contract_address: Option<String>,
    pub nft_address: String,
    pub ticks: Vec<Tick>,
}

impl TickBatch {
    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }
}

pub trait TickSource: Send + Sync {
    /// Executed trades matching `filter`.
    fn trades(&self, filter: &TradeFilter) -> Result<TickBatch, SourceError>;

    /// Open orders matching `filter`.
    fn open_orders(&self, filter: &OrderFilter) -> Result<TickBatch, SourceError>;
}

impl<S: TickSource + ?Sized> TickSource for std::sync::Arc<S> {
    fn trades(&self, filter: &TradeFilter) -> Result<TickBatch, SourceError> {
        (**self).trades(filter)
    }

    fn open_orders(&self, filter: &OrderFilter) -> Result<TickBatch, SourceError> {
        (**self).open_orders(filter)
    }
}

/// A marketplace sale listing, possibly filled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub contract_address: String,
    pub nft_address: String,
    pub token_id: String,
    pub price: Price,
    pub quantity: Quantity,
    /// Listing time, Unix seconds.
    pub listed_at: i64,
    /// Time the buyer filled the order, Unix seconds.
    pub filled_at: Option<i64>,
    pub canceled: bool,
}

impl OrderRecord {
    fn matches(&self, nft_address: &str, token_id: Option<&str>) -> bool {
        !self.canceled
            && self.nft_address == nft_address
            && token_id.map_or(true, |id| self.token_id == id)
    }

    fn fill_time(&self) -> Option<i64> {
        self.filled_at.filter(|t| *t > 0)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryTickSource {
    records: RwLock<Vec<OrderRecord>>,
}

impl InMemoryTickSource {
    pub fn new(records: Vec<OrderRecord>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }

    pub fn insert(&self, record: OrderRecord) -> Result<(), SourceError> {
        self.records
            .write()
            .map_err(|_| SourceError::Unavailable("record store poisoned".to_string()))?
            .push(record);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn select<F>(&self, nft_address: &str, keep: F) -> Result<TickBatch, SourceError>
    where
        F: Fn(&OrderRecord) -> Option<Tick>,
    {
        let records = self
            .records
            .read()
            .map_err(|_| SourceError::Unavailable("record store poisoned".to_string()))?;

        let mut batch = TickBatch {
            contract_address: None,
            nft_address: nft_address.to_string(),
            ticks: Vec::new(),
        };
        for record in records.iter() {
            if let Some(tick) = keep(record) {
                if batch.contract_address.is_none() {
                    batch.contract_address = Some(record.contract_address.clone());
                }
                batch.ticks.push(tick);
            }
        }
        Ok(batch)
    }
}

impl TickSource for InMemoryTickSource {
    fn trades(&self, filter: &TradeFilter) -> Result<TickBatch, SourceError> {
        let mut batch = self.select(&filter.nft_address, |record| {
            if !record.matches(&filter.nft_address, filter.token_id.as_deref())
                || record.listed_at < filter.from
            {
                return None;
            }
            record
                .fill_time()
                .filter(|t| *t <= filter.to)
                .map(|t| Tick::new(record.price, record.quantity, t))
        })?;
        batch.ticks.sort_by_key(|tick| tick.time);
        Ok(batch)
    }

    fn open_orders(&self, filter: &OrderFilter) -> Result<TickBatch, SourceError> {
        let mut batch = self.select(&filter.nft_address, |record| {
            let price = record.price.as_decimal();
            let open = record.matches(&filter.nft_address, filter.token_id.as_deref())
                && record.fill_time().is_none()
                && (filter.from..=filter.to).contains(&record.listed_at)
                && price >= filter.min_price
                && price <= filter.max_price;
            open.then(|| Tick::new(record.price, record.quantity, record.listed_at))
        })?;
        batch.ticks.sort_by_key(|tick| tick.price);
        Ok(batch)
    }
}
