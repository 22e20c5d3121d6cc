//! Position and price-history storage capabilities.
//!
//! `InMemoryStore` keeps a `PositionLedger` behind a mutex, so every store
//! call is an atomic read-modify-write. Per-symbol tick serialization is the
//! job of `SymbolLocks`; the store itself only guarantees that single calls
//! do not interleave.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

use crate::domain::{
    CloseReason, ConfigId, NewPosition, Position, PositionError, PositionId, PriceSeries,
    PriceTick, SeriesError,
};
use crate::ledger::PositionLedger;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Position(#[from] PositionError),

    #[error(transparent)]
    Series(#[from] SeriesError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store lock poisoned")]
    Poisoned,
}

/// Trait for position persistence.
pub trait PositionStore: Send + Sync {
    fn create(&self, new: NewPosition) -> Result<Position, StoreError>;

    /// Persist mutations of an open position (trailing stop, exit order).
    fn update(&self, position: &Position) -> Result<(), StoreError>;

    fn close(
        &self,
        id: PositionId,
        exit_price: f64,
        exit_fee: f64,
        closed_at: DateTime<Utc>,
        reason: CloseReason,
    ) -> Result<Position, StoreError>;

    fn get(&self, id: PositionId) -> Result<Option<Position>, StoreError>;

    /// Open positions for `symbol`, oldest first.
    fn open_positions(&self, symbol: &str) -> Result<Vec<Position>, StoreError>;

    /// Closed positions of `config_ids` with `closed_at >= since`.
    fn closed_since(
        &self,
        config_ids: &[ConfigId],
        since: DateTime<Utc>,
    ) -> Result<Vec<Position>, StoreError>;

    fn all_positions(&self) -> Result<Vec<Position>, StoreError>;
}

/// Trait for the recorded price series keyed by `(symbol, recorded_at)`.
pub trait PriceHistory: Send + Sync {
    fn record_price(&self, symbol: &str, tick: PriceTick) -> Result<(), StoreError>;

    fn price_history(&self, symbol: &str) -> Result<PriceSeries, StoreError>;
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    ledger: Mutex<PositionLedger>,
    prices: Mutex<HashMap<String, PriceSeries>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with previously persisted positions.
    pub fn with_positions(positions: impl IntoIterator<Item = Position>) -> Self {
        let mut ledger = PositionLedger::new();
        for position in positions {
            ledger.restore(position);
        }
        Self {
            ledger: Mutex::new(ledger),
            prices: Mutex::default(),
        }
    }

    fn ledger(&self) -> Result<MutexGuard<'_, PositionLedger>, StoreError> {
        self.ledger.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl PositionStore for InMemoryStore {
    fn create(&self, new: NewPosition) -> Result<Position, StoreError> {
        Ok(self.ledger()?.open(new)?.clone())
    }

    fn update(&self, position: &Position) -> Result<(), StoreError> {
        Ok(self.ledger()?.update(position)?)
    }

    fn close(
        &self,
        id: PositionId,
        exit_price: f64,
        exit_fee: f64,
        closed_at: DateTime<Utc>,
        reason: CloseReason,
    ) -> Result<Position, StoreError> {
        Ok(self
            .ledger()?
            .close(id, exit_price, exit_fee, closed_at, reason)?
            .clone())
    }

    fn get(&self, id: PositionId) -> Result<Option<Position>, StoreError> {
        Ok(self.ledger()?.get(id).cloned())
    }

    fn open_positions(&self, symbol: &str) -> Result<Vec<Position>, StoreError> {
        let ledger = self.ledger()?;
        let mut open: Vec<Position> = ledger.open_positions(symbol).cloned().collect();
        open.sort_by_key(|p| (p.opened_at, p.id));
        Ok(open)
    }

    fn closed_since(
        &self,
        config_ids: &[ConfigId],
        since: DateTime<Utc>,
    ) -> Result<Vec<Position>, StoreError> {
        Ok(self
            .ledger()?
            .closed_since(config_ids, since)
            .cloned()
            .collect())
    }

    fn all_positions(&self) -> Result<Vec<Position>, StoreError> {
        Ok(self.ledger()?.all().to_vec())
    }
}

impl PriceHistory for InMemoryStore {
    fn record_price(&self, symbol: &str, tick: PriceTick) -> Result<(), StoreError> {
        let mut prices = self.prices.lock().map_err(|_| StoreError::Poisoned)?;
        let series = prices
            .entry(symbol.to_string())
            .or_insert_with(|| PriceSeries::new(symbol));
        // one sample per (symbol, recorded_at); the first write wins
        if series.last().is_some_and(|last| last.recorded_at == tick.recorded_at) {
            return Ok(());
        }
        series.push(tick.price, tick.recorded_at)?;
        Ok(())
    }

    fn price_history(&self, symbol: &str) -> Result<PriceSeries, StoreError> {
        let prices = self.prices.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(prices
            .get(symbol)
            .cloned()
            .unwrap_or_else(|| PriceSeries::new(symbol)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Side;
    use chrono::{Duration, TimeZone};

    fn t(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minute)
    }

    fn new_long(minute: i64) -> NewPosition {
        NewPosition {
            symbol: "BTC/JPY".into(),
            side: Side::Long,
            quantity: 0.01,
            entry_price: 100.0,
            entry_fee: 0.0,
            trailing_stop_price: None,
            opened_at: t(minute),
            config_id: ConfigId::new("a"),
        }
    }

    #[test]
    fn open_positions_oldest_first() {
        let store = InMemoryStore::new();
        let later = store.create(new_long(5)).unwrap();
        let earlier = store.create(new_long(1)).unwrap();
        let ids: Vec<_> = store
            .open_positions("BTC/JPY")
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids, vec![earlier.id, later.id]);
    }

    #[test]
    fn close_then_query() {
        let store = InMemoryStore::new();
        let pos = store.create(new_long(0)).unwrap();
        let closed = store
            .close(pos.id, 90.0, 0.0, t(3), CloseReason::StopLoss)
            .unwrap();
        assert_eq!(closed.profit_loss, Some((90.0 - 100.0) * 0.01));
        assert!(store.open_positions("BTC/JPY").unwrap().is_empty());
        assert_eq!(
            store
                .closed_since(&[ConfigId::new("a")], t(3))
                .unwrap()
                .len(),
            1
        );
        assert!(matches!(
            store.close(pos.id, 91.0, 0.0, t(4), CloseReason::StopLoss),
            Err(StoreError::Position(PositionError::Closed(_)))
        ));
    }

    #[test]
    fn price_history_is_ordered_per_symbol() {
        let store = InMemoryStore::new();
        store.record_price("BTC/JPY", PriceTick::new(100.0, t(0))).unwrap();
        store.record_price("BTC/JPY", PriceTick::new(101.0, t(1))).unwrap();
        store.record_price("BTC/JPY", PriceTick::new(102.0, t(1))).unwrap();
        store.record_price("ETH/JPY", PriceTick::new(5.0, t(0))).unwrap();
        assert!(store
            .record_price("BTC/JPY", PriceTick::new(99.0, t(0)))
            .is_err());

        assert_eq!(store.price_history("BTC/JPY").unwrap().prices(), &[100.0, 101.0]);
        assert!(store.price_history("XRP/JPY").unwrap().is_empty());
    }
}
