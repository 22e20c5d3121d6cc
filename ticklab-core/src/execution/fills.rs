//! Fill reconciliation for submitted orders.
//!
//! Market orders are acknowledged before the exchange knows the fill price.
//! The reconciler polls executions by order id with a fixed budget and
//! interval, then falls back to the last known market price with zero fee.
//! The fallback is a recovered outcome, reported as `FillOutcome::Degraded`.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::domain::OrderId;

use super::gateway::{ExchangeGateway, Execution, OrderAck};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub price: f64,
    pub fee: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FillOutcome {
    /// Price and fee reported by the exchange.
    Filled(Fill),
    /// Polling exhausted; price is an estimate.
    Degraded(Fill),
}

impl FillOutcome {
    pub fn fill(&self) -> Fill {
        match self {
            FillOutcome::Filled(fill) | FillOutcome::Degraded(fill) => *fill,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, FillOutcome::Degraded(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FillPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for FillPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            interval: Duration::from_secs(1),
        }
    }
}

/// Size-weighted average price and summed fee, `None` for no executions.
pub fn aggregate(executions: &[Execution]) -> Option<(Fill, f64)> {
    let size: f64 = executions.iter().map(|e| e.size).sum();
    if executions.is_empty() || size <= 0.0 {
        return None;
    }
    let notional: f64 = executions.iter().map(|e| e.price * e.size).sum();
    let fee: f64 = executions.iter().map(|e| e.fee).sum();
    Some((
        Fill {
            price: notional / size,
            fee,
        },
        size,
    ))
}

/// Determine the realized price and fee of an accepted order.
///
/// Never fails: once an order is accepted the position change must be
/// recorded, so polling errors only consume attempts.
pub fn reconcile(
    gateway: &dyn ExchangeGateway,
    ack: &OrderAck,
    quantity: f64,
    fallback_price: f64,
    policy: FillPolicy,
) -> FillOutcome {
    if let Some(price) = ack.price {
        return FillOutcome::Filled(Fill {
            price,
            fee: ack.fee.unwrap_or(0.0),
        });
    }

    let mut partial = None;
    for attempt in 1..=policy.attempts {
        match gateway.executions(&ack.order_id) {
            Ok(executions) => {
                if let Some((fill, size)) = aggregate(&executions) {
                    if size >= quantity * (1.0 - 1e-9) {
                        debug!(order_id = %ack.order_id, attempt, price = fill.price, "fill reconciled");
                        return FillOutcome::Filled(fill);
                    }
                    partial = Some(fill);
                }
            }
            Err(e) => debug!(order_id = %ack.order_id, attempt, error = %e, "execution poll failed"),
        }
        if attempt < policy.attempts && !policy.interval.is_zero() {
            std::thread::sleep(policy.interval);
        }
    }

    let fill = partial.unwrap_or(Fill {
        price: fallback_price,
        fee: 0.0,
    });
    warn!(
        order_id = %ack.order_id,
        attempts = policy.attempts,
        price = fill.price,
        partial = partial.is_some(),
        "fill not confirmed, using estimated price"
    );
    FillOutcome::Degraded(fill)
}

/// Realized price and fee of a resting order from its executions.
pub fn executed_fill(
    gateway: &dyn ExchangeGateway,
    order_id: &OrderId,
    fallback_price: f64,
) -> FillOutcome {
    match gateway.executions(order_id).map(|e| aggregate(&e)) {
        Ok(Some((fill, _))) => FillOutcome::Filled(fill),
        Ok(None) | Err(_) => {
            warn!(order_id = %order_id, price = fallback_price, "executed order has no executions");
            FillOutcome::Degraded(Fill {
                price: fallback_price,
                fee: 0.0,
            })
        }
    }
}
