//! Entry/exit notifications. Delivery is best-effort.

use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use thiserror::Error;
use tracing::info;

use crate::domain::Side;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Entry,
    Exit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub side: Side,
    pub symbol: String,
    pub price: f64,
    pub quantity: f64,
    pub profit_loss: Option<f64>,
    pub profit_loss_percent: Option<f64>,
    pub reason: Option<String>,
    pub strategy_name: Option<String>,
}

impl Notification {
    pub fn entry(side: Side, symbol: &str, price: f64, quantity: f64, strategy: &str) -> Self {
        Self {
            kind: NotificationKind::Entry,
            side,
            symbol: symbol.to_string(),
            price,
            quantity,
            profit_loss: None,
            profit_loss_percent: None,
            reason: None,
            strategy_name: Some(strategy.to_string()),
        }
    }

    /// Exit notice; the percentage is PnL over the exit notional.
    pub fn exit(
        side: Side,
        symbol: &str,
        price: f64,
        quantity: f64,
        profit_loss: f64,
        reason: &str,
        strategy: Option<&str>,
    ) -> Self {
        let notional = price * quantity;
        Self {
            kind: NotificationKind::Exit,
            side,
            symbol: symbol.to_string(),
            price,
            quantity,
            profit_loss: Some(profit_loss),
            profit_loss_percent: (notional != 0.0).then(|| profit_loss / notional * 100.0),
            reason: Some(reason.to_string()),
            strategy_name: strategy.map(str::to_string),
        }
    }
}

/// Trait for notification delivery.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Writes notifications to the log.
#[derive(Debug, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, n: &Notification) -> Result<(), NotifyError> {
        info!(
            kind = ?n.kind,
            side = %n.side,
            symbol = %n.symbol,
            price = n.price,
            quantity = n.quantity,
            profit_loss = ?n.profit_loss,
            profit_loss_percent = ?n.profit_loss_percent,
            reason = ?n.reason,
            strategy = ?n.strategy_name,
            "trade notification"
        );
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _notification: &Notification) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Keeps every notification in memory.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .map_err(|_| NotifyError::Delivery("recorder lock poisoned".into()))?
            .push(notification.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::assert_approx;

    #[test]
    fn exit_percent_is_relative_to_exit_notional() {
        let n = Notification::exit(Side::Long, "BTC/JPY", 200.0, 0.5, 5.0, "trailing_stop", Some("btc"));
        assert_approx(n.profit_loss_percent.unwrap(), 5.0, 1e-12);
        assert_eq!(n.kind, NotificationKind::Exit);
        assert_eq!(n.strategy_name.as_deref(), Some("btc"));
    }

    #[test]
    fn recorder_keeps_notifications() {
        let recorder = RecordingNotifier::new();
        recorder
            .notify(&Notification::entry(Side::Short, "ETH/JPY", 10.0, 1.0, "eth"))
            .unwrap();
        assert_eq!(recorder.sent().len(), 1);
    }
}
