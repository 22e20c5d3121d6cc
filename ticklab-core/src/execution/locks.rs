//! Per-symbol single-writer locks.
//!
//! A tick holds its symbol's lock from the first ledger read to the last
//! write, so two overlapping ticks on one symbol cannot interleave their
//! trailing-stop read-modify-write. Different symbols proceed independently.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::store::StoreError;

#[derive(Debug, Default)]
pub struct SymbolLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SymbolLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle to the lock for `symbol`, created on first use.
    pub fn handle(&self, symbol: &str) -> Result<Arc<Mutex<()>>, StoreError> {
        let mut locks = self.locks.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(locks
            .entry(symbol.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone())
    }
}
