//! Position ledger: the collection of open and closed positions.
//!
//! The ledger assigns ids, enforces single closure through `Position::close`,
//! and answers the queries the tick kernel and admission control need
//! (open positions per symbol, open counts per side, recent closes).

pub mod stops;

pub use stops::{stop_breached, StopRules};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    CloseReason, ConfigId, NewPosition, Position, PositionError, PositionId, Side,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PositionLedger {
    positions: Vec<Position>,
    next_id: u64,
}

impl PositionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&mut self, new: NewPosition) -> Result<&Position, PositionError> {
        let id = PositionId(self.next_id + 1);
        let position = Position::open(id, new)?;
        self.next_id += 1;
        self.positions.push(position);
        Ok(&self.positions[self.positions.len() - 1])
    }

    /// Insert a position restored from storage, keeping ids unique.
    pub fn restore(&mut self, position: Position) {
        self.next_id = self.next_id.max(position.id.0);
        self.positions.push(position);
    }

    pub fn get(&self, id: PositionId) -> Option<&Position> {
        self.positions.iter().find(|p| p.id == id)
    }

    pub fn get_mut(&mut self, id: PositionId) -> Result<&mut Position, PositionError> {
        self.positions
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(PositionError::NotFound(id))
    }

    pub fn close(
        &mut self,
        id: PositionId,
        exit_price: f64,
        exit_fee: f64,
        closed_at: DateTime<Utc>,
        reason: CloseReason,
    ) -> Result<&Position, PositionError> {
        let position = self.get_mut(id)?;
        position.close(exit_price, exit_fee, closed_at, reason)?;
        Ok(position)
    }

    /// Replace the stored copy of an open position (trailing stop, exit order).
    pub fn update(&mut self, updated: &Position) -> Result<(), PositionError> {
        let stored = self.get_mut(updated.id)?;
        if !stored.is_open() {
            return Err(PositionError::Closed(updated.id));
        }
        *stored = updated.clone();
        Ok(())
    }

    pub fn all(&self) -> &[Position] {
        &self.positions
    }

    pub fn open_positions<'a>(&'a self, symbol: &'a str) -> impl Iterator<Item = &'a Position> + 'a {
        self.positions
            .iter()
            .filter(move |p| p.is_open() && p.symbol == symbol)
    }

    pub fn open_ids(&self, symbol: &str) -> Vec<PositionId> {
        self.open_positions(symbol).map(|p| p.id).collect()
    }

    pub fn open_count(&self, symbol: &str, side: Side) -> usize {
        self.open_positions(symbol).filter(|p| p.side == side).count()
    }

    pub fn closed(&self) -> impl Iterator<Item = &Position> {
        self.positions.iter().filter(|p| !p.is_open())
    }

    /// Closed positions of the given configurations with `closed_at >= since`.
    pub fn closed_since<'a>(
        &'a self,
        config_ids: &'a [ConfigId],
        since: DateTime<Utc>,
    ) -> impl Iterator<Item = &'a Position> + 'a {
        self.closed().filter(move |p| {
            config_ids.contains(&p.config_id) && p.closed_at.is_some_and(|at| at >= since)
        })
    }
}
