//! Artifact export: JSON results, CSV trade tapes and optimizer rankings.
//!
//! `save_artifacts` writes one directory per run, named by its `run_id`:
//! `result.json` (the full result) and `trades.csv` (the trade tape).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ticklab_core::domain::Position;

use crate::optimizer::Rankings;
use crate::runner::BacktestResult;

// ─── JSON export ────────────────────────────────────────────────────

pub fn export_json(result: &BacktestResult) -> Result<String> {
    serde_json::to_string_pretty(result).context("failed to serialize BacktestResult to JSON")
}

pub fn import_json(json: &str) -> Result<BacktestResult> {
    serde_json::from_str(json).context("failed to deserialize BacktestResult from JSON")
}

pub fn export_rankings_json(rankings: &Rankings) -> Result<String> {
    serde_json::to_string_pretty(rankings).context("failed to serialize rankings to JSON")
}

// ─── CSV export ─────────────────────────────────────────────────────

/// Trade tape, one row per position.
///
/// Columns: id, symbol, side, quantity, entry_price, exit_price, entry_fee,
/// exit_fee, gross_pnl, net_pnl, close_reason, opened_at, closed_at,
/// config_id
pub fn export_trades_csv(trades: &[Position]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    wtr.write_record([
        "id",
        "symbol",
        "side",
        "quantity",
        "entry_price",
        "exit_price",
        "entry_fee",
        "exit_fee",
        "gross_pnl",
        "net_pnl",
        "close_reason",
        "opened_at",
        "closed_at",
        "config_id",
    ])?;

    let opt = |v: Option<f64>| v.map(|x| format!("{x:.6}")).unwrap_or_default();
    for t in trades {
        wtr.write_record([
            t.id.0.to_string(),
            t.symbol.clone(),
            t.side.to_string(),
            format!("{:.8}", t.quantity),
            format!("{:.6}", t.entry_price),
            opt(t.exit_price),
            format!("{:.6}", t.entry_fee),
            opt(t.exit_fee),
            opt(t.profit_loss),
            opt(t.net_profit_loss()),
            t.close_reason
                .as_ref()
                .map(|r| r.label().to_string())
                .unwrap_or_default(),
            t.opened_at.to_rfc3339(),
            t.closed_at.map(|c| c.to_rfc3339()).unwrap_or_default(),
            t.config_id.to_string(),
        ])?;
    }

    let bytes = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(bytes).context("CSV output is not valid UTF-8")
}

// ─── Artifacts on disk ──────────────────────────────────────────────

/// Write `result.json` and `trades.csv` under `output_dir/<run_id>/`.
pub fn save_artifacts(result: &BacktestResult, output_dir: &Path) -> Result<PathBuf> {
    let run_dir = output_dir.join(&result.run_id);
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create {}", run_dir.display()))?;

    std::fs::write(run_dir.join("result.json"), export_json(result)?)
        .context("failed to write result.json")?;
    std::fs::write(run_dir.join("trades.csv"), export_trades_csv(&result.trades)?)
        .context("failed to write trades.csv")?;

    Ok(run_dir)
}

pub fn load_artifacts(run_dir: &Path) -> Result<BacktestResult> {
    let json = std::fs::read_to_string(run_dir.join("result.json"))
        .with_context(|| format!("failed to read result.json in {}", run_dir.display()))?;
    import_json(&json)
}

/// Write `rankings.json` into `output_dir`.
pub fn save_rankings(rankings: &Rankings, output_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create {}", output_dir.display()))?;
    let path = output_dir.join("rankings.json");
    std::fs::write(&path, export_rankings_json(rankings)?)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}
