//! ticklab core: tick-driven position lifecycle and strategy execution.
//!
//! This crate contains:
//! - Domain types (price series, positions, signals, ids)
//! - Indicators and the three signal generators (breakout, RSI contrarian, MA cross)
//! - The position ledger with stop math and the ratchet invariant
//! - Admission control (cooldown, position cap, spread gate)
//! - The per-tick decision kernel shared by live trading and backtests
//! - The backtest simulator
//! - The live execution coordinator and its exchange/store/log capabilities

pub mod admission;
pub mod config;
pub mod domain;
pub mod engine;
pub mod execution;
pub mod indicators;
pub mod ledger;
pub mod strategy;

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    /// Compile-time check: shared types can cross a scheduler thread.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        // Domain
        require_send::<domain::PriceSeries>();
        require_sync::<domain::PriceSeries>();
        require_send::<domain::Position>();
        require_sync::<domain::Position>();
        require_send::<domain::TradingSignal>();
        require_sync::<domain::TradingSignal>();

        // Ledger and configuration
        require_send::<ledger::PositionLedger>();
        require_sync::<ledger::PositionLedger>();
        require_send::<config::TradingConfiguration>();
        require_sync::<config::TradingConfiguration>();
        require_send::<strategy::StrategyParameters>();
        require_sync::<strategy::StrategyParameters>();

        // Execution
        require_send::<execution::InMemoryStore>();
        require_sync::<execution::InMemoryStore>();
        require_send::<execution::PaperGateway>();
        require_sync::<execution::PaperGateway>();
        require_send::<execution::JsonlEventLog>();
        require_sync::<execution::JsonlEventLog>();
        require_send::<execution::SymbolLocks>();
        require_sync::<execution::SymbolLocks>();
        require_send::<execution::ExecutionCoordinator>();
        require_sync::<execution::ExecutionCoordinator>();
        require_send::<execution::TickReport>();
        require_sync::<execution::TickReport>();
        require_send::<engine::SimulationRun>();
        require_sync::<engine::SimulationRun>();
    }

    #[test]
    fn strategies_are_send_sync() {
        fn require<T: Send + Sync + ?Sized>(_: &T) {}
        let params = strategy::StrategyParameters::default();
        for id in ["breakout", "rsi_contrarian", "ma_cross"] {
            let boxed = strategy::build_strategy(id, &params).unwrap();
            require(boxed.as_ref());
        }
    }
}
