//! Vendor-neutral brokerage contract.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Account, Order, OrderRequest, Position, Quote};

/// Capabilities every brokerage adapter provides.
///
/// Callers hold `Arc<dyn Brokerage>` and never depend on a concrete adapter.
#[async_trait]
pub trait Brokerage: Send + Sync {
    /// Check whether a valid credential is held right now.
    fn is_authenticated(&self) -> bool;

    /// Get all accounts for the authenticated user.
    async fn get_accounts(&self) -> Result<Vec<Account>>;

    /// Get all positions for an account.
    async fn get_positions(&self, account_id: &str) -> Result<Vec<Position>>;

    /// Submit a new order.
    async fn place_order(&self, account_id: &str, order: &OrderRequest) -> Result<Order>;

    /// Get the status of a specific order.
    async fn get_order_status(&self, account_id: &str, order_id: &str) -> Result<Order>;

    /// Cancel a pending order.
    async fn cancel_pending_order(&self, account_id: &str, order_id: &str) -> Result<()>;

    /// Get up to `limit` recent orders for an account.
    async fn get_recent_orders(&self, account_id: &str, limit: u32) -> Result<Vec<Order>>;

    /// Get the current quote for a symbol.
    async fn get_quote(&self, symbol: &str) -> Result<Quote>;

    /// Brokerage name for display and logs.
    fn name(&self) -> &str;
}
