//! Brokerage vendor adapters.

mod schwab_client;
mod types;

pub use schwab_client::{map_order_status, SchwabClient};
