//! Wire types for the Schwab Trader API.
//!
//! These mirror the vendor JSON narrowly and stay private to the adapter;
//! `schwab_client` maps them field by field into the canonical models.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Element of the GET /accounts array.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountEnvelope {
    pub securities_account: SecuritiesAccount,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecuritiesAccount {
    #[serde(default)]
    pub account_number: String,
    #[serde(default, rename = "type")]
    pub account_type: String,
    #[serde(default)]
    pub account_id: String,
    #[serde(default)]
    pub current_balances: Balances,
    #[serde(default)]
    pub positions: Vec<PositionResponse>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Balances {
    #[serde(default)]
    pub cash_balance: Decimal,
    #[serde(default)]
    pub buying_power: Decimal,
    #[serde(default)]
    pub long_market_value: Decimal,
}

/// Position entry from GET /accounts/{id}?fields=positions.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionResponse {
    #[serde(default)]
    pub short_quantity: Decimal,
    #[serde(default)]
    pub long_quantity: Decimal,
    #[serde(default)]
    pub average_price: Decimal,
    #[serde(default)]
    pub market_value: Decimal,
    pub instrument: Instrument,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instrument {
    pub symbol: String,
    #[serde(default)]
    pub asset_type: String,
}

/// Order from GET /accounts/{id}/orders[/{orderId}].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    #[serde(default)]
    pub order_id: Option<i64>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub quantity: Decimal,
    #[serde(default)]
    pub filled_quantity: Decimal,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub order_type: String,
    #[serde(default)]
    pub entered_time: Option<String>,
    #[serde(default)]
    pub close_time: Option<String>,
    #[serde(default)]
    pub order_leg_collection: Vec<OrderLegResponse>,
    #[serde(default)]
    pub order_activity_collection: Vec<OrderActivity>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLegResponse {
    #[serde(default)]
    pub instruction: String,
    pub instrument: Instrument,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderActivity {
    #[serde(default)]
    pub execution_legs: Vec<ExecutionLeg>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionLeg {
    #[serde(default)]
    pub quantity: Decimal,
    #[serde(default)]
    pub price: Decimal,
    #[serde(default)]
    pub time: Option<String>,
}

/// Body for POST /accounts/{id}/orders.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPayload {
    pub order_type: &'static str,
    pub session: &'static str,
    pub duration: &'static str,
    pub order_strategy_type: &'static str,
    pub order_leg_collection: Vec<OrderLegPayload>,
    /// Limit orders only; market orders must not carry it.
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "rust_decimal::serde::float_option"
    )]
    pub price: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLegPayload {
    pub instruction: &'static str,
    #[serde(with = "rust_decimal::serde::float")]
    pub quantity: Decimal,
    pub instrument: Instrument,
}
