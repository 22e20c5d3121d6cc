//! Paper replay: drive the live coordinator over recorded prices.
//!
//! Each traded symbol gets its own `PaperGateway`; all symbols share one
//! position store, one event log and one set of symbol locks. Samples from
//! every symbol are merged into a single timeline, and each sample triggers
//! one scheduler tick for the configurations trading that symbol.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use ticklab_core::config::{CoordinatorSettings, TradingConfiguration};
use ticklab_core::domain::{Position, PriceSeries};
use ticklab_core::execution::{
    EventLog, ExecutionCoordinator, GatewayError, InMemoryStore, Notifier, PaperGateway,
    PaperSettings, PositionStore, StoreError, SymbolLocks,
};

use crate::metrics::TradeStats;
use crate::scheduler::TickScheduler;

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("no prices for '{symbol}', traded by an active configuration")]
    NoPrices { symbol: String },

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Per-configuration outcome of a replay.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigSummary {
    pub config_id: String,
    pub name: String,
    pub symbol: String,
    pub open_positions: usize,
    pub stats: TradeStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    /// Scheduler ticks run across all symbols.
    pub ticks: usize,
    /// Configuration ticks that failed.
    pub failures: usize,
    /// Final paper balance per symbol gateway.
    pub balances: BTreeMap<String, f64>,
    pub summaries: Vec<ConfigSummary>,
    pub positions: Vec<Position>,
}

/// Replay `prices` through a paper exchange for every active configuration.
pub fn replay_paper(
    configs: &[TradingConfiguration],
    prices: &BTreeMap<String, PriceSeries>,
    paper: &PaperSettings,
    events: Arc<dyn EventLog>,
    notifier: Arc<dyn Notifier>,
) -> Result<ReplayReport, ReplayError> {
    let store = Arc::new(InMemoryStore::new());
    let locks = Arc::new(SymbolLocks::new());

    let mut lanes: BTreeMap<String, (Arc<PaperGateway>, TickScheduler)> = BTreeMap::new();
    for config in configs.iter().filter(|c| c.active) {
        if lanes.contains_key(&config.symbol) {
            continue;
        }
        let series = prices
            .get(&config.symbol)
            .ok_or_else(|| ReplayError::NoPrices {
                symbol: config.symbol.clone(),
            })?;
        let gateway = Arc::new(PaperGateway::new(series.clone(), paper.clone()));
        let coordinator = ExecutionCoordinator::new(
            gateway.clone(),
            store.clone(),
            store.clone(),
            events.clone(),
            notifier.clone(),
        )
        .with_settings(CoordinatorSettings::immediate())
        .with_locks(locks.clone());
        lanes.insert(
            config.symbol.clone(),
            (gateway, TickScheduler::new(coordinator)),
        );
    }

    // (time, symbol) for every sample, oldest first
    let mut timeline: Vec<_> = lanes
        .keys()
        .filter_map(|symbol| prices.get(symbol).map(|s| (symbol, s)))
        .flat_map(|(symbol, series)| series.timestamps().iter().map(move |at| (*at, symbol)))
        .collect();
    timeline.sort();

    let mut ticks = 0;
    let mut failures = 0;
    for (_, symbol) in timeline {
        let Some((gateway, scheduler)) = lanes.get(symbol) else {
            continue;
        };
        let Some(tick) = gateway.advance()? else {
            continue;
        };
        let outcomes = scheduler.run_symbol(configs, symbol, tick.recorded_at);
        failures += outcomes.iter().filter(|o| o.result.is_err()).count();
        ticks += 1;
    }

    let mut balances = BTreeMap::new();
    for (symbol, (gateway, _)) in &lanes {
        balances.insert(symbol.clone(), gateway.balance()?);
    }

    let positions = store.all_positions()?;
    let summaries = configs
        .iter()
        .filter(|c| c.active)
        .map(|config| {
            let owned: Vec<Position> = positions
                .iter()
                .filter(|p| p.config_id == config.id)
                .cloned()
                .collect();
            let closed: Vec<Position> = owned.iter().filter(|p| !p.is_open()).cloned().collect();
            ConfigSummary {
                config_id: config.id.to_string(),
                name: config.name.clone(),
                symbol: config.symbol.clone(),
                open_positions: owned.len() - closed.len(),
                stats: TradeStats::compute(&closed),
            }
        })
        .collect();

    info!(ticks, failures, positions = positions.len(), "paper replay finished");

    Ok(ReplayReport {
        ticks,
        failures,
        balances,
        summaries,
        positions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use ticklab_core::execution::{InMemoryEventLog, NoopNotifier};
    use ticklab_core::strategy::StrategyParameters;

    fn series(symbol: &str, prices: &[f64], offset_secs: i64) -> PriceSeries {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let mut s = PriceSeries::new(symbol);
        for (i, &p) in prices.iter().enumerate() {
            s.push(p, start + Duration::minutes(i as i64) + Duration::seconds(offset_secs))
                .unwrap();
        }
        s
    }

    fn breakout(id: &str, symbol: &str) -> TradingConfiguration {
        let params = StrategyParameters {
            lookback_period: 3,
            breakout_threshold: 1.0,
            trade_size: 1.0,
            ..StrategyParameters::default()
        };
        TradingConfiguration::new(id, symbol, "breakout", params)
    }

    #[test]
    fn replays_each_symbol_on_its_own_gateway() {
        let mut prices = BTreeMap::new();
        prices.insert(
            "BTC/JPY".to_string(),
            series("BTC/JPY", &[100.0, 100.0, 100.0, 105.0, 103.0], 0),
        );
        prices.insert("ETH/JPY".to_string(), series("ETH/JPY", &[50.0; 5], 30));

        let configs = vec![breakout("btc", "BTC/JPY"), breakout("eth", "ETH/JPY")];
        let events = Arc::new(InMemoryEventLog::new());
        let report = replay_paper(
            &configs,
            &prices,
            &PaperSettings::default(),
            events.clone(),
            Arc::new(NoopNotifier),
        )
        .unwrap();

        assert_eq!(report.ticks, 10);
        assert_eq!(report.failures, 0);
        assert_eq!(report.balances.len(), 2);
        assert_eq!(events.records().len(), 10 + report.positions.iter().filter(|p| !p.is_open()).count());

        let btc = &report.summaries[0];
        assert_eq!(btc.config_id, "btc");
        assert_eq!(btc.stats.total_trades + btc.open_positions, 1);
        let eth = &report.summaries[1];
        assert_eq!(eth.stats.total_trades + eth.open_positions, 0);
    }

    #[test]
    fn missing_prices_for_active_symbol() {
        let prices = BTreeMap::new();
        let err = replay_paper(
            &[breakout("btc", "BTC/JPY")],
            &prices,
            &PaperSettings::default(),
            Arc::new(InMemoryEventLog::new()),
            Arc::new(NoopNotifier),
        )
        .unwrap_err();
        assert!(matches!(err, ReplayError::NoPrices { .. }));
    }
}
