//! Canonical, vendor-neutral data models for accounts, positions, orders and quotes.

mod account;
mod order;
mod position;

pub use account::Account;
pub use order::{Order, OrderAction, OrderRequest, OrderStatus, OrderType};
pub use position::Position;

/// Quote fields keyed by name, passed through untyped because vendor schemas vary.
pub type Quote = serde_json::Map<String, serde_json::Value>;
