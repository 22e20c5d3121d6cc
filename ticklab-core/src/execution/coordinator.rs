//! Live execution coordinator.
//!
//! `run_tick` drives one configuration through one tick:
//!
//! ```text
//! lock symbol → fetch price → reconcile resting exit orders
//!   → exit pass (strategy exit, trailing ratchet, trailing check, fixed stop)
//!   → signal → reversal → admission → submit → reconcile fill → persist/notify
//! ```
//!
//! Exit and entry decisions come from the kernel shared with the backtest
//! simulator; this module only performs the I/O around them. Transient
//! gateway and store failures abort the tick with a `TickError`. Refused
//! orders, admission rejections and degraded fills are reported as values.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::admission::{AdmissionControl, AdmissionDecision, RejectReason};
use crate::config::{family_members, CoordinatorSettings, TradingConfiguration};
use crate::domain::{
    CloseReason, ConfigId, NewPosition, OrderId, Position, PositionError, PositionId, PriceTick,
    Side, TradingSignal,
};
use crate::engine::{check_exit, last_losing_close, plan_entry, EntryPlan, ExitContext};
use crate::ledger::StopRules;
use crate::strategy::{build_strategy, SignalGenerator, StrategyError};

use super::event_log::{EventLog, EventRecord};
use super::fills::{executed_fill, reconcile, FillOutcome};
use super::gateway::{
    ExchangeGateway, GatewayError, OrderRequest, OrderResponse, OrderSide, OrderStatus,
};
use super::locks::SymbolLocks;
use super::notifier::{Notification, Notifier};
use super::store::{PositionStore, PriceHistory, StoreError};

#[derive(Debug, Error)]
pub enum TickError {
    #[error(transparent)]
    Strategy(#[from] StrategyError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Position(#[from] PositionError),
}

/// A position closed during a tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClosedTrade {
    pub position: Position,
    pub order_id: OrderId,
    /// The fill price is an estimate (polling exhausted).
    pub degraded: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EntryOutcome {
    NoEntry,
    Entered {
        position: Position,
        order_id: OrderId,
        degraded: bool,
    },
    Rejected {
        reason: RejectReason,
    },
    /// Order refused by the exchange, or a reversal close could not complete.
    Failed {
        message: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct TickReport {
    pub config_id: ConfigId,
    pub symbol: String,
    pub price: f64,
    pub at: DateTime<Utc>,
    pub signal: TradingSignal,
    pub exits: Vec<ClosedTrade>,
    /// Positions whose exit order was refused; they stay open.
    pub refused_exits: Vec<PositionId>,
    pub entry: EntryOutcome,
}

/// Inputs fixed for the duration of one tick.
struct Tick<'a> {
    config: &'a TradingConfiguration,
    registry: &'a [TradingConfiguration],
    price: f64,
    now: DateTime<Utc>,
}

impl Tick<'_> {
    /// Display name of the configuration owning a position.
    fn owner_name<'s>(&'s self, owner: &'s ConfigId) -> &'s str {
        self.registry
            .iter()
            .find(|c| c.id == *owner)
            .map(|c| c.name.as_str())
            .unwrap_or(owner.as_str())
    }
}

#[derive(Default)]
struct Exits {
    closed: Vec<ClosedTrade>,
    refused: Vec<PositionId>,
}

impl Exits {
    /// Returns whether the position was closed.
    fn record(&mut self, id: PositionId, result: Option<ClosedTrade>) -> bool {
        match result {
            Some(trade) => {
                self.closed.push(trade);
                true
            }
            None => {
                self.refused.push(id);
                false
            }
        }
    }
}

pub struct ExecutionCoordinator {
    gateway: Arc<dyn ExchangeGateway>,
    store: Arc<dyn PositionStore>,
    prices: Arc<dyn PriceHistory>,
    events: Arc<dyn EventLog>,
    notifier: Arc<dyn Notifier>,
    locks: Arc<SymbolLocks>,
    settings: CoordinatorSettings,
}

impl ExecutionCoordinator {
    pub fn new(
        gateway: Arc<dyn ExchangeGateway>,
        store: Arc<dyn PositionStore>,
        prices: Arc<dyn PriceHistory>,
        events: Arc<dyn EventLog>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            gateway,
            store,
            prices,
            events,
            notifier,
            locks: Arc::new(SymbolLocks::new()),
            settings: CoordinatorSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: CoordinatorSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Share symbol locks with other coordinators over the same store.
    pub fn with_locks(mut self, locks: Arc<SymbolLocks>) -> Self {
        self.locks = locks;
        self
    }

    pub fn settings(&self) -> &CoordinatorSettings {
        &self.settings
    }

    pub fn event_log(&self) -> &dyn EventLog {
        self.events.as_ref()
    }

    /// Run one tick for `config`.
    ///
    /// `registry` is every known configuration. It resolves the cooldown
    /// family and the owner names used in exit notifications.
    pub fn run_tick(
        &self,
        config: &TradingConfiguration,
        registry: &[TradingConfiguration],
        now: DateTime<Utc>,
    ) -> Result<TickReport, TickError> {
        let strategy = build_strategy(&config.strategy, &config.parameters)?;
        let lock = self.locks.handle(&config.symbol)?;
        let _guard = lock.lock().map_err(|_| StoreError::Poisoned)?;

        let params = &config.parameters;
        let series = self
            .gateway
            .market_data(&config.symbol, params.market_data_limit)?;
        let price = series
            .last()
            .map(|tick| tick.price)
            .ok_or_else(|| GatewayError::NoMarketData {
                symbol: config.symbol.clone(),
            })?;
        if let Err(e) = self
            .prices
            .record_price(&config.symbol, PriceTick::new(price, now))
        {
            warn!(symbol = %config.symbol, at = %now, error = %e, "price sample not recorded");
        }

        let tick = Tick {
            config,
            registry,
            price,
            now,
        };
        let mut exits = Exits::default();

        self.reconcile_exit_orders(&tick, &mut exits)?;

        let window = series.full_window();
        let ctx = ExitContext {
            price,
            now,
            window: &window,
            strategy: strategy.as_ref(),
            owner: &config.id,
            rules: StopRules::from_params(params),
        };
        for mut position in self.store.open_positions(&config.symbol)? {
            let before = position.trailing_stop_price;
            let decision = check_exit(&mut position, &ctx)?;
            if position.trailing_stop_price != before {
                self.store.update(&position)?;
                debug!(
                    position = %position.id,
                    from = ?before,
                    to = ?position.trailing_stop_price,
                    "trailing stop moved"
                );
            }
            if let Some(reason) = decision {
                let result = self.exit(&tick, &position, reason)?;
                exits.record(position.id, result);
            }
        }

        let signal = strategy.analyze(&window);
        let open = self.store.open_positions(&config.symbol)?;
        let entry = match plan_entry(&signal, &open) {
            EntryPlan::Hold => EntryOutcome::NoEntry,
            EntryPlan::NothingToSell => {
                debug!(config = %config.id, symbol = %config.symbol, "sell signal with no long open");
                EntryOutcome::NoEntry
            }
            EntryPlan::CloseLatestLong(id) => {
                if let Some(position) = open.iter().find(|p| p.id == id) {
                    let result = self.exit(&tick, position, CloseReason::SignalExit)?;
                    exits.record(id, result);
                }
                EntryOutcome::NoEntry
            }
            EntryPlan::Enter {
                side,
                quantity,
                price: limit,
                reversal,
            } => self.enter(
                &tick,
                strategy.as_ref(),
                side,
                quantity,
                limit,
                &reversal,
                &open,
                &mut exits,
            )?,
        };

        self.log_evaluation(&tick, &signal, &entry);

        Ok(TickReport {
            config_id: config.id.clone(),
            symbol: config.symbol.clone(),
            price,
            at: now,
            signal,
            exits: exits.closed,
            refused_exits: exits.refused,
            entry,
        })
    }

    /// Settle resting exit orders left on open positions.
    fn reconcile_exit_orders(&self, tick: &Tick<'_>, exits: &mut Exits) -> Result<(), TickError> {
        for mut position in self.store.open_positions(&tick.config.symbol)? {
            let Some(order_id) = position.exit_order_id.clone() else {
                continue;
            };
            let limit = position.exit_order_price;

            match self.gateway.order_status(&order_id)? {
                OrderStatus::Executed => {
                    let outcome =
                        executed_fill(self.gateway.as_ref(), &order_id, limit.unwrap_or(tick.price));
                    let trade = self.record_close(
                        tick,
                        &position,
                        outcome,
                        CloseReason::ExitOrderFilled,
                        &order_id,
                    )?;
                    exits.closed.push(trade);
                }
                OrderStatus::Waiting => {
                    self.gateway.cancel_order(&order_id)?;
                    position.set_exit_order(None)?;
                    self.store.update(&position)?;
                    info!(position = %position.id, order_id = %order_id, "resting exit order canceled");

                    let gapped = limit.is_some_and(|limit| {
                        gapped_through(
                            position.side,
                            tick.price,
                            limit,
                            self.settings.emergency_gap_percent,
                        )
                    });
                    if gapped {
                        warn!(
                            position = %position.id,
                            price = tick.price,
                            limit = ?limit,
                            "price gapped through resting exit, closing at market"
                        );
                        let result = self.exit(tick, &position, CloseReason::EmergencyExit)?;
                        exits.record(position.id, result);
                    }
                }
                status => {
                    debug!(position = %position.id, order_id = %order_id, status = ?status, "clearing stale exit order");
                    position.set_exit_order(None)?;
                    self.store.update(&position)?;
                }
            }
        }
        Ok(())
    }

    /// Close `position` at market. `Ok(None)` when the exchange refuses.
    fn exit(
        &self,
        tick: &Tick<'_>,
        position: &Position,
        reason: CloseReason,
    ) -> Result<Option<ClosedTrade>, TickError> {
        if let Some(order_id) = &position.exit_order_id {
            if let Err(e) = self.gateway.cancel_order(order_id) {
                warn!(position = %position.id, order_id = %order_id, error = %e, "cancel of resting exit failed");
            }
        }

        let request = OrderRequest {
            symbol: position.symbol.clone(),
            side: OrderSide::closing(position.side),
            quantity: position.quantity,
            price: None,
        };
        match self.gateway.submit_order(&request)? {
            OrderResponse::Refused { message } => {
                warn!(
                    position = %position.id,
                    reason = %reason,
                    message = %message,
                    "exit order refused, position stays open"
                );
                self.append_event(EventRecord {
                    symbol: position.symbol.clone(),
                    action: exit_action(&reason, request.side),
                    quantity: position.quantity,
                    price: Some(tick.price),
                    result: json!({ "success": false, "position_id": position.id.0 }),
                    message: Some(message),
                    executed_at: tick.now,
                });
                Ok(None)
            }
            OrderResponse::Accepted(ack) => {
                let outcome = reconcile(
                    self.gateway.as_ref(),
                    &ack,
                    position.quantity,
                    tick.price,
                    self.settings.fill_policy(),
                );
                self.record_close(tick, position, outcome, reason, &ack.order_id)
                    .map(Some)
            }
        }
    }

    /// Persist a filled exit, then log and notify.
    fn record_close(
        &self,
        tick: &Tick<'_>,
        position: &Position,
        outcome: FillOutcome,
        reason: CloseReason,
        order_id: &OrderId,
    ) -> Result<ClosedTrade, TickError> {
        let fill = outcome.fill();
        let closed = self
            .store
            .close(position.id, fill.price, fill.fee, tick.now, reason.clone())?;
        let profit_loss = closed.profit_loss.unwrap_or(0.0);

        info!(
            position = %closed.id,
            symbol = %closed.symbol,
            side = %closed.side,
            reason = %reason,
            price = fill.price,
            profit_loss,
            degraded = outcome.is_degraded(),
            "position closed"
        );
        self.append_event(EventRecord {
            symbol: closed.symbol.clone(),
            action: exit_action(&reason, OrderSide::closing(closed.side)),
            quantity: closed.quantity,
            price: Some(fill.price),
            result: json!({
                "success": true,
                "order_id": order_id.to_string(),
                "position_id": closed.id.0,
                "fee": fill.fee,
                "profit_loss": profit_loss,
                "net_profit_loss": closed.net_profit_loss(),
                "degraded": outcome.is_degraded(),
            }),
            message: None,
            executed_at: tick.now,
        });
        if tick.config.notify {
            self.send(&Notification::exit(
                closed.side,
                &closed.symbol,
                fill.price,
                closed.quantity,
                profit_loss,
                reason.label(),
                Some(tick.owner_name(&closed.config_id)),
            ));
        }

        Ok(ClosedTrade {
            position: closed,
            order_id: order_id.clone(),
            degraded: outcome.is_degraded(),
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn enter(
        &self,
        tick: &Tick<'_>,
        strategy: &dyn SignalGenerator,
        side: Side,
        quantity: f64,
        limit: Option<f64>,
        reversal: &[PositionId],
        open: &[Position],
        exits: &mut Exits,
    ) -> Result<EntryOutcome, TickError> {
        let config = tick.config;

        for id in reversal {
            let Some(position) = open.iter().find(|p| p.id == *id) else {
                continue;
            };
            let result = self.exit(tick, position, CloseReason::Reversal)?;
            if !exits.record(*id, result) {
                return Ok(EntryOutcome::Failed {
                    message: format!("reversal close of {id} was refused"),
                });
            }
        }

        let admission = AdmissionControl::new(&config.parameters, strategy);
        let last_loss = match admission.cooldown_since(tick.now) {
            Some(since) => last_losing_close(
                &self
                    .store
                    .closed_since(&family_members(config, tick.registry), since)?,
            ),
            None => None,
        };
        let open_same_side = self
            .store
            .open_positions(&config.symbol)?
            .iter()
            .filter(|p| p.side == side)
            .count();
        let reference = limit.unwrap_or(tick.price);

        let decision = admission.evaluate(side, open_same_side, reference, last_loss, || {
            self.gateway.spread(&config.symbol)
        })?;
        if let AdmissionDecision::Rejected(reason) = decision {
            info!(
                config = %config.id,
                symbol = %config.symbol,
                side = %side,
                reason = %reason,
                "entry rejected"
            );
            return Ok(EntryOutcome::Rejected { reason });
        }

        let request = OrderRequest {
            symbol: config.symbol.clone(),
            side: OrderSide::opening(side),
            quantity,
            price: limit,
        };
        let ack = match self.gateway.submit_order(&request)? {
            OrderResponse::Accepted(ack) => ack,
            OrderResponse::Refused { message } => {
                warn!(config = %config.id, side = %side, message = %message, "entry order refused");
                return Ok(EntryOutcome::Failed { message });
            }
        };

        let outcome = reconcile(
            self.gateway.as_ref(),
            &ack,
            quantity,
            reference,
            self.settings.fill_policy(),
        );
        let fill = outcome.fill();
        let rules = StopRules::from_params(&config.parameters);
        let position = self.store.create(NewPosition {
            symbol: config.symbol.clone(),
            side,
            quantity,
            entry_price: fill.price,
            entry_fee: fill.fee,
            trailing_stop_price: Some(rules.initial_trailing(side, fill.price)),
            opened_at: tick.now,
            config_id: config.id.clone(),
        })?;

        info!(
            position = %position.id,
            config = %config.id,
            symbol = %position.symbol,
            side = %side,
            price = fill.price,
            quantity,
            degraded = outcome.is_degraded(),
            "position opened"
        );
        if config.notify {
            self.send(&Notification::entry(
                side,
                &config.symbol,
                fill.price,
                quantity,
                &config.name,
            ));
        }

        Ok(EntryOutcome::Entered {
            position,
            order_id: ack.order_id,
            degraded: outcome.is_degraded(),
        })
    }

    /// Signal-evaluation row; for entries it doubles as the fill record.
    fn log_evaluation(&self, tick: &Tick<'_>, signal: &TradingSignal, entry: &EntryOutcome) {
        let (price, result, message) = match entry {
            EntryOutcome::Entered {
                position,
                order_id,
                degraded,
            } => (
                position.entry_price,
                json!({
                    "success": true,
                    "order_id": order_id.to_string(),
                    "position_id": position.id.0,
                    "fee": position.entry_fee,
                    "degraded": degraded,
                }),
                signal.reason.clone(),
            ),
            EntryOutcome::Rejected { reason } => (
                tick.price,
                json!({ "success": false, "rejected": reason }),
                Some(reason.to_string()),
            ),
            EntryOutcome::Failed { message } => (
                tick.price,
                json!({ "success": false }),
                Some(message.clone()),
            ),
            EntryOutcome::NoEntry => (tick.price, json!({ "success": true }), signal.reason.clone()),
        };
        self.append_event(EventRecord {
            symbol: tick.config.symbol.clone(),
            action: signal.action.to_string(),
            quantity: signal.quantity,
            price: Some(price),
            result,
            message,
            executed_at: tick.now,
        });
    }

    fn append_event(&self, record: EventRecord) {
        if let Err(e) = self.events.append(&record) {
            warn!(action = %record.action, symbol = %record.symbol, error = %e, "event log append failed");
        }
    }

    fn send(&self, notification: &Notification) {
        if let Err(e) = self.notifier.notify(notification) {
            warn!(symbol = %notification.symbol, error = %e, "notification failed");
        }
    }
}

/// Event-log action for an exit, e.g. `trailing_stop_sell`.
pub fn exit_action(reason: &CloseReason, side: OrderSide) -> String {
    format!("{}_{}", reason.label(), side)
}

/// Whether `price` has run through a resting exit limit by more than `gap_percent`.
pub fn gapped_through(side: Side, price: f64, limit: f64, gap_percent: f64) -> bool {
    match side {
        Side::Long => price < limit * (1.0 - gap_percent / 100.0),
        Side::Short => price > limit * (1.0 + gap_percent / 100.0),
    }
}
