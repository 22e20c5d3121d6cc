//! Price samples and the append-only per-symbol series every component reads.
//!
//! Prices and timestamps are stored in parallel vectors so strategies can look
//! at a plain `&[f64]` window without copying on every tick.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One recorded price sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceTick {
    pub price: f64,
    pub recorded_at: DateTime<Utc>,
}

impl PriceTick {
    pub fn new(price: f64, recorded_at: DateTime<Utc>) -> Self {
        Self { price, recorded_at }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum SeriesError {
    #[error("price must be finite and positive, got {0}")]
    InvalidPrice(f64),

    #[error("sample at {next} is earlier than the last sample at {last}")]
    OutOfOrder {
        last: DateTime<Utc>,
        next: DateTime<Utc>,
    },
}

/// Ordered, append-only sequence of price samples for one symbol.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PriceSeries {
    symbol: String,
    prices: Vec<f64>,
    timestamps: Vec<DateTime<Utc>>,
}

impl PriceSeries {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            prices: Vec::new(),
            timestamps: Vec::new(),
        }
    }

    /// Build a series from samples that must already be in ascending time order.
    pub fn from_ticks(
        symbol: impl Into<String>,
        ticks: impl IntoIterator<Item = PriceTick>,
    ) -> Result<Self, SeriesError> {
        let mut series = Self::new(symbol);
        for tick in ticks {
            series.push(tick.price, tick.recorded_at)?;
        }
        Ok(series)
    }

    /// Append a sample. Timestamps must be non-decreasing.
    pub fn push(&mut self, price: f64, recorded_at: DateTime<Utc>) -> Result<(), SeriesError> {
        if !price.is_finite() || price <= 0.0 {
            return Err(SeriesError::InvalidPrice(price));
        }
        if let Some(&last) = self.timestamps.last() {
            if recorded_at < last {
                return Err(SeriesError::OutOfOrder {
                    last,
                    next: recorded_at,
                });
            }
        }
        self.prices.push(price);
        self.timestamps.push(recorded_at);
        Ok(())
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    pub fn prices(&self) -> &[f64] {
        &self.prices
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    pub fn tick(&self, index: usize) -> Option<PriceTick> {
        Some(PriceTick::new(
            *self.prices.get(index)?,
            *self.timestamps.get(index)?,
        ))
    }

    pub fn last(&self) -> Option<PriceTick> {
        self.len().checked_sub(1).and_then(|i| self.tick(i))
    }

    /// Window over samples `[0, end)`; the last sample in it is "current".
    pub fn window(&self, end: usize) -> PriceWindow<'_> {
        let end = end.min(self.len());
        PriceWindow {
            prices: &self.prices[..end],
            timestamps: &self.timestamps[..end],
        }
    }

    /// The last `limit` samples of the prefix ending at `end`, the view a
    /// live market-data fetch of `limit` samples would give at that tick.
    pub fn recent_window(&self, end: usize, limit: usize) -> PriceWindow<'_> {
        let end = end.min(self.len());
        let start = end.saturating_sub(limit);
        PriceWindow {
            prices: &self.prices[start..end],
            timestamps: &self.timestamps[start..end],
        }
    }

    pub fn full_window(&self) -> PriceWindow<'_> {
        self.window(self.len())
    }

    /// Copy of samples `[start, end)`, clamped to the series bounds.
    pub fn slice(&self, start: usize, end: usize) -> PriceSeries {
        let end = end.min(self.len());
        let start = start.min(end);
        PriceSeries {
            symbol: self.symbol.clone(),
            prices: self.prices[start..end].to_vec(),
            timestamps: self.timestamps[start..end].to_vec(),
        }
    }

    /// Copy of the most recent `limit` samples, as a market-data fetch would return.
    pub fn tail(&self, limit: usize) -> PriceSeries {
        self.slice(self.len().saturating_sub(limit), self.len())
    }
}

/// Borrowed view of a series prefix handed to strategies.
#[derive(Debug, Clone, Copy)]
pub struct PriceWindow<'a> {
    pub prices: &'a [f64],
    pub timestamps: &'a [DateTime<Utc>],
}

impl<'a> PriceWindow<'a> {
    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    pub fn current(&self) -> Option<f64> {
        self.prices.last().copied()
    }

    pub fn now(&self) -> Option<DateTime<Utc>> {
        self.timestamps.last().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minute)
    }

    #[test]
    fn push_rejects_out_of_order_samples() {
        let mut series = PriceSeries::new("BTC/JPY");
        series.push(100.0, t(1)).unwrap();
        let err = series.push(101.0, t(0)).unwrap_err();
        assert!(matches!(err, SeriesError::OutOfOrder { .. }));
        assert_eq!(series.len(), 1);
    }

    #[test]
    fn push_rejects_non_positive_prices() {
        let mut series = PriceSeries::new("BTC/JPY");
        assert_eq!(series.push(0.0, t(0)), Err(SeriesError::InvalidPrice(0.0)));
        assert!(series.push(f64::NAN, t(0)).is_err());
    }

    #[test]
    fn window_and_tail_views() {
        let ticks = (0..5).map(|i| PriceTick::new(100.0 + i as f64, t(i)));
        let series = PriceSeries::from_ticks("ETH/JPY", ticks).unwrap();

        let w = series.window(3);
        assert_eq!(w.prices, &[100.0, 101.0, 102.0]);
        assert_eq!(w.current(), Some(102.0));
        assert_eq!(w.now(), Some(t(2)));

        let recent = series.recent_window(4, 2);
        assert_eq!(recent.prices, &[102.0, 103.0]);
        assert_eq!(recent.now(), Some(t(3)));
        assert_eq!(series.recent_window(2, 10).prices, &[100.0, 101.0]);
        assert!(series.recent_window(3, 0).is_empty());

        let tail = series.tail(2);
        assert_eq!(tail.prices(), &[103.0, 104.0]);
        assert_eq!(tail.symbol(), "ETH/JPY");
        assert_eq!(series.tail(99).len(), 5);
        assert_eq!(series.slice(1, 3).prices(), &[101.0, 102.0]);
        assert!(series.slice(4, 2).is_empty());
    }
}
