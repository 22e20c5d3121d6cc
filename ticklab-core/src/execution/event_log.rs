//! Event log: append-only record of fills, signal evaluations and failures.
//!
//! `JsonlEventLog` writes one JSON object per line, which keeps the file
//! readable after a partial write and easy to stream. Malformed lines are
//! skipped on read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::store::StoreError;

/// One event-log row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub symbol: String,
    /// `buy`, `short`, `{reason}_{sell|buy}`, `hold`, `sell`, `error`.
    pub action: String,
    pub quantity: f64,
    pub price: Option<f64>,
    pub result: serde_json::Value,
    pub message: Option<String>,
    pub executed_at: DateTime<Utc>,
}

/// Trait for the append-only event log.
pub trait EventLog: Send + Sync {
    fn append(&self, record: &EventRecord) -> Result<(), StoreError>;
}

/// JSONL file event log.
pub struct JsonlEventLog {
    path: PathBuf,
    // serializes appends from concurrent ticks
    write_lock: Mutex<()>,
}

impl JsonlEventLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read_all(&self) -> io::Result<Vec<EventRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let reader = io::BufReader::new(fs::File::open(&self.path)?);
        let mut records = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            if let Ok(record) = serde_json::from_str::<EventRecord>(&line) {
                records.push(record);
            }
        }
        Ok(records)
    }
}

impl EventLog for JsonlEventLog {
    fn append(&self, record: &EventRecord) -> Result<(), StoreError> {
        let json = serde_json::to_string(record)?;
        let _guard = self.write_lock.lock().map_err(|_| StoreError::Poisoned)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{json}")?;
        file.flush()?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryEventLog {
    records: Mutex<Vec<EventRecord>>,
}

impl InMemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<EventRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    pub fn actions(&self) -> Vec<String> {
        self.records().into_iter().map(|r| r.action).collect()
    }
}

impl EventLog for InMemoryEventLog {
    fn append(&self, record: &EventRecord) -> Result<(), StoreError> {
        self.records
            .lock()
            .map_err(|_| StoreError::Poisoned)?
            .push(record.clone());
        Ok(())
    }
}
