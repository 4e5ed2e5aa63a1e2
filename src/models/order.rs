//! Order models: requests submitted by callers and orders reported back.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{BrokerageError, Result};

/// Direction of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderAction {
    Buy,
    Sell,
}

impl OrderAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderAction::Buy => "BUY",
            OrderAction::Sell => "SELL",
        }
    }

    /// Case-insensitive parse of "BUY"/"SELL".
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "BUY" => Some(OrderAction::Buy),
            "SELL" => Some(OrderAction::Sell),
            _ => None,
        }
    }
}

/// Pricing style of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    Market,
    Limit,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Market => "MARKET",
            OrderType::Limit => "LIMIT",
        }
    }

    /// Case-insensitive parse of "MARKET"/"LIMIT".
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "MARKET" => Some(OrderType::Market),
            "LIMIT" => Some(OrderType::Limit),
            _ => None,
        }
    }
}

/// Canonical order lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    Pending,
    Filled,
    Cancelled,
    Rejected,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Filled => "FILLED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Rejected => "REJECTED",
        }
    }

    /// Filled, cancelled and rejected orders never change again.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatus::Pending)
    }

    /// Pending moves to any terminal state; terminal states stay put.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        match self {
            OrderStatus::Pending => next.is_terminal(),
            _ => false,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request to place an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub action: OrderAction,
    pub order_type: OrderType,
    pub quantity: Decimal,

    /// Required for limit orders, ignored for market orders
    #[serde(default)]
    pub limit_price: Option<Decimal>,
}

impl OrderRequest {
    pub fn market(symbol: impl Into<String>, action: OrderAction, quantity: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            action,
            order_type: OrderType::Market,
            quantity,
            limit_price: None,
        }
    }

    pub fn limit(
        symbol: impl Into<String>,
        action: OrderAction,
        quantity: Decimal,
        price: Decimal,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            action,
            order_type: OrderType::Limit,
            quantity,
            limit_price: Some(price),
        }
    }

    /// Check the request before anything is sent to a brokerage.
    pub fn validate(&self) -> Result<()> {
        if self.symbol.trim().is_empty() {
            return Err(BrokerageError::InvalidOrder("symbol is empty".to_string()));
        }
        if self.quantity <= Decimal::ZERO {
            return Err(BrokerageError::InvalidOrder(format!(
                "quantity must be positive, got {}",
                self.quantity
            )));
        }
        match (self.order_type, self.limit_price) {
            (OrderType::Limit, None) => Err(BrokerageError::InvalidOrder(
                "limit order requires a price".to_string(),
            )),
            (OrderType::Limit, Some(price)) if price <= Decimal::ZERO => Err(
                BrokerageError::InvalidOrder(format!("limit price must be positive, got {}", price)),
            ),
            _ => Ok(()),
        }
    }
}

/// Order as reported by a brokerage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Brokerage order id (empty when the brokerage did not return one)
    pub id: String,

    pub symbol: String,
    pub action: OrderAction,
    pub order_type: OrderType,
    pub quantity: Decimal,

    #[serde(default)]
    pub limit_price: Option<Decimal>,

    pub status: OrderStatus,

    #[serde(default)]
    pub filled_quantity: Decimal,

    #[serde(default)]
    pub filled_price: Decimal,

    /// When the order was entered
    pub submitted_at: Option<DateTime<Utc>>,

    /// When the order was filled
    #[serde(default)]
    pub filled_at: Option<DateTime<Utc>>,

    /// Raw brokerage response body, kept for audit and debugging
    #[serde(default)]
    pub raw_response: String,
}

impl Order {
    /// Fraction of the order quantity filled so far (0 for zero-quantity orders).
    pub fn fill_ratio(&self) -> Decimal {
        if self.quantity.is_zero() {
            return Decimal::ZERO;
        }
        self.filled_quantity
            .checked_div(self.quantity)
            .unwrap_or(Decimal::ZERO)
    }

    /// True when a cancel request makes sense.
    pub fn is_open(&self) -> bool {
        self.status == OrderStatus::Pending
    }
}
