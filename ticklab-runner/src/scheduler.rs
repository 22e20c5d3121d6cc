//! Tick scheduler: runs every active configuration once per tick.
//!
//! Configurations run sequentially and in isolation. One configuration's
//! failure is logged, appended to the event log as an `error` row, and
//! reported in its outcome; the others still run.

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{error, warn};

use ticklab_core::config::TradingConfiguration;
use ticklab_core::domain::ConfigId;
use ticklab_core::execution::{EventRecord, ExecutionCoordinator, TickError, TickReport};

/// Result of one configuration's tick.
#[derive(Debug)]
pub struct TickOutcome {
    pub config_id: ConfigId,
    pub result: Result<TickReport, TickError>,
}

pub struct TickScheduler {
    coordinator: ExecutionCoordinator,
}

impl TickScheduler {
    pub fn new(coordinator: ExecutionCoordinator) -> Self {
        Self { coordinator }
    }

    pub fn coordinator(&self) -> &ExecutionCoordinator {
        &self.coordinator
    }

    /// Run one tick for every active configuration in `configs`.
    ///
    /// `configs` doubles as the registry for cooldown families and owner
    /// names. Inactive configurations are skipped and produce no outcome.
    pub fn run_once(&self, configs: &[TradingConfiguration], now: DateTime<Utc>) -> Vec<TickOutcome> {
        self.run_selected(configs, |_| true, now)
    }

    /// Like `run_once`, restricted to configurations trading `symbol`.
    /// The whole of `configs` still serves as the registry.
    pub fn run_symbol(
        &self,
        configs: &[TradingConfiguration],
        symbol: &str,
        now: DateTime<Utc>,
    ) -> Vec<TickOutcome> {
        self.run_selected(configs, |c| c.symbol == symbol, now)
    }

    fn run_selected(
        &self,
        configs: &[TradingConfiguration],
        select: impl Fn(&TradingConfiguration) -> bool,
        now: DateTime<Utc>,
    ) -> Vec<TickOutcome> {
        configs
            .iter()
            .filter(|config| config.active && select(config))
            .map(|config| {
                let result = self.coordinator.run_tick(config, configs, now);
                if let Err(e) = &result {
                    self.record_failure(config, e, now);
                }
                TickOutcome {
                    config_id: config.id.clone(),
                    result,
                }
            })
            .collect()
    }

    fn record_failure(&self, config: &TradingConfiguration, e: &TickError, now: DateTime<Utc>) {
        error!(
            config = %config.id,
            strategy = %config.strategy,
            symbol = %config.symbol,
            error = %e,
            "tick failed"
        );
        let record = EventRecord {
            symbol: config.symbol.clone(),
            action: "error".into(),
            quantity: 0.0,
            price: None,
            result: json!({
                "config_id": config.id.as_str(),
                "strategy": config.strategy,
            }),
            message: Some(e.to_string()),
            executed_at: now,
        };
        if let Err(log_err) = self.coordinator.event_log().append(&record) {
            warn!(config = %config.id, error = %log_err, "failed to record tick failure");
        }
    }
}
