//! Price loading for backtests and paper replays.
//!
//! Three sources:
//! 1. CSV exports of the price history table (`id,symbol,price,recorded_at`)
//! 2. A `PriceHistory` store
//! 3. A seeded synthetic random walk, for demos and benches
//!
//! Every source yields an ascending `PriceSeries`.

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use ticklab_core::domain::{PriceSeries, PriceTick, SeriesError};
use ticklab_core::execution::{PriceHistory, StoreError};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to open {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("row {row}: unrecognized timestamp '{value}'")]
    BadTimestamp { row: usize, value: String },

    #[error("row {row}: {source}")]
    BadSample { row: usize, source: SeriesError },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("no prices for '{symbol}'")]
    NoData { symbol: String },
}

#[derive(Debug, Deserialize)]
struct PriceRow {
    #[serde(default)]
    #[allow(dead_code)]
    id: Option<u64>,
    symbol: String,
    price: f64,
    recorded_at: String,
}

/// Parse an RFC 3339 timestamp or a naive `%Y-%m-%d %H:%M:%S` one taken as UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Read every symbol in a price CSV, each series sorted ascending.
pub fn read_csv_all<R: Read>(reader: R) -> Result<BTreeMap<String, PriceSeries>, LoadError> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

    let mut ticks: BTreeMap<String, Vec<PriceTick>> = BTreeMap::new();
    for (i, row) in rdr.deserialize::<PriceRow>().enumerate() {
        let row = row?;
        // header is line 1
        let line = i + 2;
        let recorded_at =
            parse_timestamp(&row.recorded_at).ok_or_else(|| LoadError::BadTimestamp {
                row: line,
                value: row.recorded_at.clone(),
            })?;
        ticks
            .entry(row.symbol)
            .or_default()
            .push(PriceTick::new(row.price, recorded_at));
    }

    let mut out = BTreeMap::new();
    for (symbol, mut samples) in ticks {
        samples.sort_by_key(|t| t.recorded_at);
        let mut series = PriceSeries::new(symbol.clone());
        for (row, tick) in samples.into_iter().enumerate() {
            series
                .push(tick.price, tick.recorded_at)
                .map_err(|source| LoadError::BadSample { row, source })?;
        }
        debug!(symbol = %symbol, samples = series.len(), "loaded price series");
        out.insert(symbol, series);
    }
    Ok(out)
}

/// Read one symbol's series from a price CSV.
pub fn read_csv<R: Read>(reader: R, symbol: &str) -> Result<PriceSeries, LoadError> {
    read_csv_all(reader)?
        .remove(symbol)
        .ok_or_else(|| LoadError::NoData {
            symbol: symbol.to_string(),
        })
}

fn open(path: &Path) -> Result<std::fs::File, LoadError> {
    std::fs::File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub fn load_csv(path: &Path, symbol: &str) -> Result<PriceSeries, LoadError> {
    read_csv(open(path)?, symbol)
}

pub fn load_csv_all(path: &Path) -> Result<BTreeMap<String, PriceSeries>, LoadError> {
    read_csv_all(open(path)?)
}

/// Load a symbol's recorded history from a store.
pub fn load_history(history: &dyn PriceHistory, symbol: &str) -> Result<PriceSeries, LoadError> {
    let series = history.price_history(symbol)?;
    if series.is_empty() {
        return Err(LoadError::NoData {
            symbol: symbol.to_string(),
        });
    }
    Ok(series)
}

/// Deterministic one-minute random walk.
///
/// Steps are drawn uniformly from ±0.3% of the previous price, so the same
/// `(n, seed)` always yields the same series.
pub fn synthetic_walk(symbol: &str, n: usize, seed: u64, start_price: f64) -> PriceSeries {
    let mut rng = StdRng::seed_from_u64(seed);
    let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).single().unwrap_or_default();

    let mut series = PriceSeries::new(symbol);
    let mut price = start_price.max(1.0);
    for i in 0..n {
        if i > 0 {
            let step: f64 = rng.gen_range(-0.003..0.003);
            price = (price * (1.0 + step)).max(1.0);
        }
        // price stays positive and timestamps strictly ascend
        let _ = series.push(price, start + Duration::minutes(i as i64));
    }
    series
}
