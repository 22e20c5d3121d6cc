//! Live execution: exchange/store capabilities, fill reconciliation and the
//! per-tick coordinator.

pub mod coordinator;
pub mod event_log;
pub mod fills;
pub mod gateway;
pub mod locks;
pub mod notifier;
pub mod paper;
pub mod store;

pub use coordinator::{ClosedTrade, EntryOutcome, ExecutionCoordinator, TickError, TickReport};
pub use event_log::{EventLog, EventRecord, InMemoryEventLog, JsonlEventLog};
pub use fills::{Fill, FillOutcome, FillPolicy};
pub use gateway::{
    ExchangeGateway, Execution, GatewayError, OrderAck, OrderRequest, OrderResponse, OrderSide,
    OrderStatus,
};
pub use locks::SymbolLocks;
pub use notifier::{
    Notification, NotificationKind, Notifier, NoopNotifier, NotifyError, RecordingNotifier,
    TracingNotifier,
};
pub use paper::{PaperGateway, PaperSettings};
pub use store::{InMemoryStore, PositionStore, PriceHistory, StoreError};
