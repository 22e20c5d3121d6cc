//! Tick engine: the shared decision kernel and the backtest simulator.

pub mod kernel;
pub mod simulator;

pub use kernel::{check_exit, last_losing_close, plan_entry, EntryPlan, ExitContext};
pub use simulator::{BacktestSimulator, SimulationRun, SimulationSettings};
