//! In-process paper exchange replaying a recorded price series.
//!
//! The gateway exposes the series up to a cursor; `advance` moves the cursor
//! one sample forward and matches resting limit orders against the new
//! price. Market orders fill immediately at the current price; a limit
//! order that is already marketable fills immediately at its limit. Balance,
//! inventory and the order book live behind one mutex, so every order is an
//! atomic read-modify-write.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::domain::{OrderId, PriceSeries, PriceTick};

use super::gateway::{
    ExchangeGateway, Execution, GatewayError, OrderAck, OrderRequest, OrderResponse, OrderSide,
    OrderStatus,
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaperSettings {
    pub initial_balance: f64,
    /// Fee per fill as a fraction of notional.
    pub fee_rate: f64,
    /// Static ask-minus-bid reported by `spread`.
    pub spread: f64,
    /// When false, acks carry no price and fills must be polled.
    pub report_fills_inline: bool,
}

impl Default for PaperSettings {
    fn default() -> Self {
        Self {
            initial_balance: 10_000.0,
            fee_rate: 0.0,
            spread: 0.0,
            report_fills_inline: true,
        }
    }
}

#[derive(Debug, Clone)]
struct PaperOrder {
    symbol: String,
    side: OrderSide,
    quantity: f64,
    limit: Option<f64>,
    status: OrderStatus,
    executions: Vec<Execution>,
}

#[derive(Debug)]
struct PaperBook {
    cursor: usize,
    balance: f64,
    inventory: HashMap<String, f64>,
    orders: HashMap<OrderId, PaperOrder>,
    next_order: u64,
}

pub struct PaperGateway {
    series: PriceSeries,
    settings: PaperSettings,
    book: Mutex<PaperBook>,
}

impl PaperGateway {
    /// Gateway positioned before the first sample; call `advance` to start.
    pub fn new(series: PriceSeries, settings: PaperSettings) -> Self {
        Self {
            series,
            book: Mutex::new(PaperBook {
                cursor: 0,
                balance: settings.initial_balance,
                inventory: HashMap::new(),
                orders: HashMap::new(),
                next_order: 1,
            }),
            settings,
        }
    }

    fn book(&self) -> Result<MutexGuard<'_, PaperBook>, GatewayError> {
        self.book
            .lock()
            .map_err(|_| GatewayError::Exchange("paper book lock poisoned".into()))
    }

    /// Reveal the next sample and match resting orders against it.
    /// Returns `None` once the series is exhausted.
    pub fn advance(&self) -> Result<Option<PriceTick>, GatewayError> {
        let mut book = self.book()?;
        let Some(tick) = self.series.tick(book.cursor) else {
            return Ok(None);
        };
        book.cursor += 1;

        let fee_rate = self.settings.fee_rate;
        let crossed: Vec<OrderId> = book
            .orders
            .iter()
            .filter(|(_, o)| o.status == OrderStatus::Waiting)
            .filter(|(_, o)| match (o.side, o.limit) {
                (OrderSide::Buy, Some(limit)) => tick.price <= limit,
                (OrderSide::Sell, Some(limit)) => tick.price >= limit,
                (_, None) => false,
            })
            .map(|(id, _)| id.clone())
            .collect();
        for id in crossed {
            let Some(order) = book.orders.get(&id).cloned() else {
                continue;
            };
            let price = order.limit.unwrap_or(tick.price);
            let fee = price * order.quantity * fee_rate;
            book.settle(&order.symbol, order.side, order.quantity, price, fee);
            if let Some(o) = book.orders.get_mut(&id) {
                o.status = OrderStatus::Executed;
                o.executions.push(Execution {
                    price,
                    size: o.quantity,
                    fee,
                });
            }
            debug!(order_id = %id, price, "resting order filled");
        }
        Ok(Some(tick))
    }

    /// Current sample, if `advance` has been called.
    pub fn current(&self) -> Result<Option<PriceTick>, GatewayError> {
        let book = self.book()?;
        Ok(book
            .cursor
            .checked_sub(1)
            .and_then(|i| self.series.tick(i)))
    }

    pub fn balance(&self) -> Result<f64, GatewayError> {
        Ok(self.book()?.balance)
    }

    /// Signed net holdings of `symbol`; negative while short.
    pub fn inventory(&self, symbol: &str) -> Result<f64, GatewayError> {
        Ok(self.book()?.inventory.get(symbol).copied().unwrap_or(0.0))
    }

    fn check_symbol(&self, symbol: &str) -> Result<(), GatewayError> {
        if symbol == self.series.symbol() {
            Ok(())
        } else {
            Err(GatewayError::NoMarketData {
                symbol: symbol.to_string(),
            })
        }
    }
}

impl PaperBook {
    fn settle(&mut self, symbol: &str, side: OrderSide, quantity: f64, price: f64, fee: f64) {
        let held = self.inventory.entry(symbol.to_string()).or_insert(0.0);
        match side {
            OrderSide::Buy => {
                *held += quantity;
                self.balance -= price * quantity + fee;
            }
            OrderSide::Sell => {
                *held -= quantity;
                self.balance += price * quantity - fee;
            }
        }
    }

    fn next_order_id(&mut self) -> OrderId {
        let id = OrderId::new(format!("paper-{}", self.next_order));
        self.next_order += 1;
        id
    }
}

impl ExchangeGateway for PaperGateway {
    fn market_data(&self, symbol: &str, limit: usize) -> Result<PriceSeries, GatewayError> {
        self.check_symbol(symbol)?;
        let cursor = self.book()?.cursor;
        let visible = self.series.slice(cursor.saturating_sub(limit), cursor);
        if visible.is_empty() {
            return Err(GatewayError::NoMarketData {
                symbol: symbol.to_string(),
            });
        }
        Ok(visible)
    }

    fn spread(&self, symbol: &str) -> Result<f64, GatewayError> {
        self.check_symbol(symbol)?;
        Ok(self.settings.spread)
    }

    fn submit_order(&self, request: &OrderRequest) -> Result<OrderResponse, GatewayError> {
        self.check_symbol(&request.symbol)?;
        if request.quantity <= 0.0 || !request.quantity.is_finite() {
            return Ok(OrderResponse::Refused {
                message: format!("invalid quantity {}", request.quantity),
            });
        }

        let mut book = self.book()?;
        let current = book
            .cursor
            .checked_sub(1)
            .and_then(|i| self.series.tick(i))
            .ok_or_else(|| GatewayError::NoMarketData {
                symbol: request.symbol.clone(),
            })?;
        let order_id = book.next_order_id();

        let marketable = match (request.side, request.price) {
            (_, None) => true,
            (OrderSide::Buy, Some(limit)) => limit >= current.price,
            (OrderSide::Sell, Some(limit)) => limit <= current.price,
        };
        if let Some(limit) = request.price.filter(|_| !marketable) {
            book.orders.insert(
                order_id.clone(),
                PaperOrder {
                    symbol: request.symbol.clone(),
                    side: request.side,
                    quantity: request.quantity,
                    limit: Some(limit),
                    status: OrderStatus::Waiting,
                    executions: Vec::new(),
                },
            );
            return Ok(OrderResponse::Accepted(OrderAck {
                order_id,
                price: None,
                fee: None,
            }));
        }

        let price = request.price.unwrap_or(current.price);
        let fee = price * request.quantity * self.settings.fee_rate;
        if request.side == OrderSide::Buy && price * request.quantity + fee > book.balance {
            return Ok(OrderResponse::Refused {
                message: "insufficient balance".into(),
            });
        }

        book.settle(&request.symbol, request.side, request.quantity, price, fee);
        book.orders.insert(
            order_id.clone(),
            PaperOrder {
                symbol: request.symbol.clone(),
                side: request.side,
                quantity: request.quantity,
                limit: request.price,
                status: OrderStatus::Executed,
                executions: vec![Execution {
                    price,
                    size: request.quantity,
                    fee,
                }],
            },
        );

        let inline = self.settings.report_fills_inline;
        Ok(OrderResponse::Accepted(OrderAck {
            order_id,
            price: inline.then_some(price),
            fee: inline.then_some(fee),
        }))
    }

    fn order_status(&self, order_id: &OrderId) -> Result<OrderStatus, GatewayError> {
        Ok(self
            .book()?
            .orders
            .get(order_id)
            .map(|o| o.status)
            .unwrap_or(OrderStatus::NotFound))
    }

    fn executions(&self, order_id: &OrderId) -> Result<Vec<Execution>, GatewayError> {
        Ok(self
            .book()?
            .orders
            .get(order_id)
            .map(|o| o.executions.clone())
            .unwrap_or_default())
    }

    fn cancel_order(&self, order_id: &OrderId) -> Result<(), GatewayError> {
        let mut book = self.book()?;
        match book.orders.get_mut(order_id) {
            Some(order) if order.status == OrderStatus::Waiting => {
                order.status = OrderStatus::Canceled;
                Ok(())
            }
            Some(_) => Ok(()),
            None => Err(GatewayError::Exchange(format!("unknown order {order_id}"))),
        }
    }
}
