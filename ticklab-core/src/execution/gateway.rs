//! Exchange gateway capability and its wire-level value types.
//!
//! The ExchangeGateway trait abstracts over a real exchange and the in-process
//! paper gateway so the coordinator can be driven and tested without a
//! network. Errors are transient I/O failures; a refused order is a normal
//! `OrderResponse::Refused` value.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::domain::{OrderId, PriceSeries, Side};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GatewayError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by exchange (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("no market data for {symbol}")]
    NoMarketData { symbol: String },

    #[error("exchange error: {0}")]
    Exchange(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Order side that opens a position on `side`.
    pub fn opening(side: Side) -> Self {
        match side {
            Side::Long => OrderSide::Buy,
            Side::Short => OrderSide::Sell,
        }
    }

    /// Order side that closes a position on `side`.
    pub fn closing(side: Side) -> Self {
        Self::opening(side.opposite())
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => f.write_str("buy"),
            OrderSide::Sell => f.write_str("sell"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: f64,
    /// `None` submits a market order.
    pub price: Option<f64>,
}

/// Accepted order. Market orders usually come back without price or fee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAck {
    pub order_id: OrderId,
    pub price: Option<f64>,
    pub fee: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OrderResponse {
    Accepted(OrderAck),
    Refused { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Waiting,
    Executed,
    Canceled,
    Expired,
    NotFound,
    Error,
}

/// One (partial) fill of an order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub price: f64,
    pub size: f64,
    /// Negative for maker rebates.
    pub fee: f64,
}

/// Trait for exchange access.
pub trait ExchangeGateway: Send + Sync {
    /// Most recent `limit` prices for `symbol`, oldest first.
    fn market_data(&self, symbol: &str, limit: usize) -> Result<PriceSeries, GatewayError>;

    /// Current ask minus bid.
    fn spread(&self, symbol: &str) -> Result<f64, GatewayError>;

    fn submit_order(&self, request: &OrderRequest) -> Result<OrderResponse, GatewayError>;

    fn order_status(&self, order_id: &OrderId) -> Result<OrderStatus, GatewayError>;

    fn executions(&self, order_id: &OrderId) -> Result<Vec<Execution>, GatewayError>;

    fn cancel_order(&self, order_id: &OrderId) -> Result<(), GatewayError>;

    fn buy(
        &self,
        symbol: &str,
        quantity: f64,
        price: Option<f64>,
    ) -> Result<OrderResponse, GatewayError> {
        self.submit_order(&OrderRequest {
            symbol: symbol.to_string(),
            side: OrderSide::Buy,
            quantity,
            price,
        })
    }

    fn sell(
        &self,
        symbol: &str,
        quantity: f64,
        price: Option<f64>,
    ) -> Result<OrderResponse, GatewayError> {
        self.submit_order(&OrderRequest {
            symbol: symbol.to_string(),
            side: OrderSide::Sell,
            quantity,
            price,
        })
    }
}
