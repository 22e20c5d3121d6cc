//! Domain types for the tick engine.

pub mod ids;
pub mod position;
pub mod price;
pub mod signal;

pub use ids::{ConfigId, OrderId, PositionId};
pub use position::{CloseReason, NewPosition, Position, PositionError, PositionStatus, Side};
pub use price::{PriceSeries, PriceTick, PriceWindow, SeriesError};
pub use signal::{SignalAction, TradingSignal};

/// Symbol type alias
pub type Symbol = String;
