//! Schwab Trader API adapter implementing the `Brokerage` trait.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::LOCATION;
use reqwest::{Client, Response};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::brokerage::Brokerage;
use crate::config::BrokerConfig;
use crate::error::{BrokerageError, Result};
use crate::models::{
    Account, Order, OrderAction, OrderRequest, OrderStatus, OrderType, Position, Quote,
};
use crate::oauth::{
    AuthenticatedTransport, CredentialStore, FileCredentialStore, OAuthConfig, OAuthSession,
};

use super::types::*;

const ACCOUNTS_PATH: &str = "/trader/v1/accounts";
const QUOTES_PATH: &str = "/marketdata/v1/quotes";

/// Client for the Schwab Trader and Market Data APIs.
pub struct SchwabClient {
    transport: AuthenticatedTransport,
}

impl SchwabClient {
    /// Wrap an existing transport.
    pub fn new(transport: AuthenticatedTransport) -> Self {
        Self { transport }
    }

    /// Build the session, credential store and transport from config and
    /// restore any persisted credential.
    pub fn from_config(config: &BrokerConfig) -> Result<Self> {
        let http = Client::builder().timeout(config.timeout()).build()?;

        let store: Arc<dyn CredentialStore> =
            Arc::new(FileCredentialStore::new(config.token_file.clone()));
        let session = OAuthSession::new(
            OAuthConfig {
                client_id: config.client_id.clone(),
                client_secret: config.client_secret.clone(),
                redirect_uri: config.redirect_uri.clone(),
                auth_url: config.auth_url().to_string(),
                token_url: config.token_url().to_string(),
            },
            http.clone(),
            store,
        );
        session.restore()?;

        let transport =
            AuthenticatedTransport::new(http, Arc::new(session), config.api_base_url());
        Ok(Self::new(transport))
    }

    /// The OAuth session backing this client.
    pub fn session(&self) -> &Arc<OAuthSession> {
        self.transport.session()
    }

    fn orders_path(account_id: &str) -> String {
        format!("{}/{}/orders", ACCOUNTS_PATH, urlencoding::encode(account_id))
    }

    fn order_path(account_id: &str, order_id: &str) -> String {
        format!(
            "{}/{}",
            Self::orders_path(account_id),
            urlencoding::encode(order_id)
        )
    }
}

/// Read the body, turning any non-2xx status into `VendorApi`.
async fn read_body(response: Response) -> Result<String> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(BrokerageError::VendorApi {
            status: status.as_u16(),
            body,
        });
    }

    Ok(body)
}

fn decode<T: DeserializeOwned>(context: &'static str, body: &str) -> Result<T> {
    serde_json::from_str(body).map_err(|e| BrokerageError::parse(context, e))
}

/// Build the vendor order body. Limit orders carry `price`; market orders never do.
pub(crate) fn build_order_payload(order: &OrderRequest) -> OrderPayload {
    let price = match order.order_type {
        OrderType::Limit => order.limit_price,
        OrderType::Market => None,
    };

    OrderPayload {
        order_type: order.order_type.as_str(),
        session: "NORMAL",
        duration: "DAY",
        order_strategy_type: "SINGLE",
        order_leg_collection: vec![OrderLegPayload {
            instruction: order.action.as_str(),
            quantity: order.quantity,
            instrument: Instrument {
                symbol: order.symbol.clone(),
                asset_type: "EQUITY".to_string(),
            },
        }],
        price,
    }
}

/// Normalize a vendor status string. Unknown values (including empty) are pending.
pub fn map_order_status(status: &str) -> OrderStatus {
    match status.to_uppercase().as_str() {
        "FILLED" => OrderStatus::Filled,
        "CANCELED" | "CANCELLED" => OrderStatus::Cancelled,
        "REJECTED" => OrderStatus::Rejected,
        _ => OrderStatus::Pending,
    }
}

/// Trailing path segment of a `Location` header value.
pub(crate) fn order_id_from_location(location: &str) -> String {
    location
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string()
}

/// Parse vendor timestamps: RFC 3339, or the `+0000` offset form Schwab emits.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%z"))
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z"))
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| warn!(timestamp = %raw, "Unparseable timestamp"))
        .ok()
}

fn map_instruction(instruction: &str) -> OrderAction {
    let upper = instruction.to_uppercase();
    if upper.starts_with("BUY") {
        OrderAction::Buy
    } else if upper.starts_with("SELL") {
        OrderAction::Sell
    } else {
        warn!(instruction = %instruction, "Unknown order instruction");
        OrderAction::Buy
    }
}

fn map_account(envelope: AccountEnvelope) -> Account {
    let acc = envelope.securities_account;
    Account::new(
        acc.account_id,
        acc.account_number,
        acc.account_type,
        acc.current_balances.cash_balance,
        acc.current_balances.buying_power,
        acc.current_balances.long_market_value,
    )
}

fn map_position(p: PositionResponse) -> Position {
    Position::from_holdings(
        p.instrument.symbol,
        p.long_quantity,
        p.short_quantity,
        p.average_price,
        p.market_value,
    )
}

/// Average execution price weighted by leg quantity. `None` when nothing
/// executed or the arithmetic overflows.
fn volume_weighted_price(legs: &[&ExecutionLeg]) -> Option<Decimal> {
    let mut notional = Decimal::ZERO;
    let mut executed = Decimal::ZERO;
    for leg in legs {
        notional = notional.checked_add(leg.quantity.checked_mul(leg.price)?)?;
        executed = executed.checked_add(leg.quantity)?;
    }

    if executed.is_zero() {
        return None;
    }
    notional.checked_div(executed)
}

/// Map a vendor order into the canonical model, keeping `raw` for audit.
fn map_order(so: OrderResponse, raw: String) -> Order {
    let status = map_order_status(&so.status);

    let order_type = OrderType::parse(&so.order_type).unwrap_or_else(|| {
        warn!(order_type = %so.order_type, "Unsupported order type, treating as market");
        OrderType::Market
    });

    let (symbol, action) = match so.order_leg_collection.first() {
        Some(leg) => (
            leg.instrument.symbol.clone(),
            map_instruction(&leg.instruction),
        ),
        None => (String::new(), OrderAction::Buy),
    };

    // Volume-weighted fill price from execution legs, falling back to the order price.
    let legs: Vec<&ExecutionLeg> = so
        .order_activity_collection
        .iter()
        .flat_map(|a| a.execution_legs.iter())
        .collect();
    let filled_price = match volume_weighted_price(&legs) {
        Some(price) => price,
        None if !so.filled_quantity.is_zero() => so.price.unwrap_or_default(),
        None => Decimal::ZERO,
    };

    let filled_at = match status {
        OrderStatus::Filled => so
            .close_time
            .as_deref()
            .or_else(|| legs.last().and_then(|l| l.time.as_deref()))
            .and_then(parse_timestamp),
        _ => None,
    };

    Order {
        id: so.order_id.map(|id| id.to_string()).unwrap_or_default(),
        symbol,
        action,
        order_type,
        quantity: so.quantity,
        limit_price: match order_type {
            OrderType::Limit => so.price,
            OrderType::Market => None,
        },
        status,
        filled_quantity: so.filled_quantity,
        filled_price,
        submitted_at: so.entered_time.as_deref().and_then(parse_timestamp),
        filled_at,
        raw_response: raw,
    }
}

#[async_trait]
impl Brokerage for SchwabClient {
    fn is_authenticated(&self) -> bool {
        self.session().is_authenticated()
    }

    async fn get_accounts(&self) -> Result<Vec<Account>> {
        let body = read_body(self.transport.get(ACCOUNTS_PATH).await?).await?;
        let envelopes: Vec<AccountEnvelope> = decode("accounts", &body)?;

        debug!(count = envelopes.len(), "Fetched accounts");
        Ok(envelopes.into_iter().map(map_account).collect())
    }

    async fn get_positions(&self, account_id: &str) -> Result<Vec<Position>> {
        let path = format!(
            "{}/{}?fields=positions",
            ACCOUNTS_PATH,
            urlencoding::encode(account_id)
        );
        let body = read_body(self.transport.get(&path).await?).await?;
        let envelope: AccountEnvelope = decode("positions", &body)?;

        Ok(envelope
            .securities_account
            .positions
            .into_iter()
            .map(map_position)
            .collect())
    }

    async fn place_order(&self, account_id: &str, order: &OrderRequest) -> Result<Order> {
        order.validate()?;

        let payload = build_order_payload(order);
        let response = self
            .transport
            .post(&Self::orders_path(account_id), &payload)
            .await?;

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = read_body(response).await?;

        // TODO: fall back to matching get_recent_orders by symbol and time when Location is absent.
        let id = match location {
            Some(location) => order_id_from_location(&location),
            None => {
                warn!(symbol = %order.symbol, "Order accepted without a Location header; id unknown");
                String::new()
            }
        };

        info!(
            order_id = %id,
            symbol = %order.symbol,
            action = order.action.as_str(),
            order_type = order.order_type.as_str(),
            quantity = %order.quantity,
            "Order placed"
        );

        Ok(Order {
            id,
            symbol: order.symbol.clone(),
            action: order.action,
            order_type: order.order_type,
            quantity: order.quantity,
            limit_price: order.limit_price,
            status: OrderStatus::Pending,
            filled_quantity: Decimal::ZERO,
            filled_price: Decimal::ZERO,
            submitted_at: Some(Utc::now()),
            filled_at: None,
            raw_response: body,
        })
    }

    async fn get_order_status(&self, account_id: &str, order_id: &str) -> Result<Order> {
        let path = Self::order_path(account_id, order_id);
        let body = read_body(self.transport.get(&path).await?).await?;
        let so: OrderResponse = decode("order", &body)?;

        Ok(map_order(so, body))
    }

    async fn cancel_pending_order(&self, account_id: &str, order_id: &str) -> Result<()> {
        let path = Self::order_path(account_id, order_id);
        read_body(self.transport.delete(&path).await?).await?;

        info!(order_id = %order_id, "Order cancelled");
        Ok(())
    }

    async fn get_recent_orders(&self, account_id: &str, limit: u32) -> Result<Vec<Order>> {
        let path = format!("{}?maxResults={}", Self::orders_path(account_id), limit);
        let body = read_body(self.transport.get(&path).await?).await?;

        let items: Vec<serde_json::Value> = decode("orders", &body)?;
        items
            .into_iter()
            .map(|item| {
                let raw = item.to_string();
                let so: OrderResponse =
                    serde_json::from_value(item).map_err(|e| BrokerageError::parse("orders", e))?;
                Ok(map_order(so, raw))
            })
            .collect()
    }

    async fn get_quote(&self, symbol: &str) -> Result<Quote> {
        let path = format!("{}?symbols={}", QUOTES_PATH, urlencoding::encode(symbol));
        let body = read_body(self.transport.get(&path).await?).await?;

        decode("quote", &body)
    }

    fn name(&self) -> &str {
        "schwab"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_limit_payload_has_price() {
        let order = OrderRequest::limit("ABC", OrderAction::Buy, dec!(10), dec!(150.25));
        let json = serde_json::to_value(build_order_payload(&order)).unwrap();

        assert_eq!(json["orderType"], "LIMIT");
        assert_eq!(json["price"], serde_json::json!(150.25));
        assert_eq!(json["session"], "NORMAL");
        assert_eq!(json["duration"], "DAY");
        assert_eq!(json["orderStrategyType"], "SINGLE");

        let leg = &json["orderLegCollection"][0];
        assert_eq!(leg["instruction"], "BUY");
        assert_eq!(leg["quantity"], serde_json::json!(10.0));
        assert_eq!(leg["instrument"]["symbol"], "ABC");
        assert_eq!(leg["instrument"]["assetType"], "EQUITY");
    }

    #[test]
    fn test_market_payload_omits_price() {
        let mut order = OrderRequest::market("ABC", OrderAction::Buy, dec!(10));
        // A stray price on a market order must still be dropped.
        order.limit_price = Some(dec!(150.25));
        let json = serde_json::to_value(build_order_payload(&order)).unwrap();

        assert_eq!(json["orderType"], "MARKET");
        assert!(json.get("price").is_none());
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(map_order_status("filled"), OrderStatus::Filled);
        assert_eq!(map_order_status("FILLED"), OrderStatus::Filled);
        assert_eq!(map_order_status("canceled"), OrderStatus::Cancelled);
        assert_eq!(map_order_status("CANCELLED"), OrderStatus::Cancelled);
        assert_eq!(map_order_status("Rejected"), OrderStatus::Rejected);
        assert_eq!(map_order_status("WORKING"), OrderStatus::Pending);
        assert_eq!(map_order_status("AWAITING_PARENT_ORDER"), OrderStatus::Pending);
        assert_eq!(map_order_status(""), OrderStatus::Pending);
    }

    #[test]
    fn test_order_id_from_location() {
        assert_eq!(
            order_id_from_location("https://api.schwabapi.com/trader/v1/accounts/HASH/orders/1001"),
            "1001"
        );
        assert_eq!(order_id_from_location("/orders/42/"), "42");
        assert_eq!(order_id_from_location("77"), "77");
    }

    #[test]
    fn test_parse_timestamp_forms() {
        assert!(parse_timestamp("2024-03-01T14:30:00Z").is_some());
        assert!(parse_timestamp("2024-03-01T14:30:00+0000").is_some());
        assert!(parse_timestamp("2024-03-01T14:30:00.123+0000").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_map_account_ignores_upstream_total() {
        let envelope: AccountEnvelope = serde_json::from_value(serde_json::json!({
            "securitiesAccount": {
                "accountNumber": "12345678",
                "type": "MARGIN",
                "accountId": "HASH1",
                "currentBalances": {
                    "cashBalance": 1000.5,
                    "buyingPower": 2000,
                    "longMarketValue": 4000.25,
                    "liquidationValue": 99999
                }
            }
        }))
        .unwrap();

        let account = map_account(envelope);
        assert_eq!(account.total_value, dec!(5000.75));
        assert_eq!(account.account_type, "MARGIN");
    }

    #[test]
    fn test_map_order_with_executions() {
        let raw = serde_json::json!({
            "orderId": 1001,
            "status": "FILLED",
            "quantity": 10,
            "filledQuantity": 10,
            "price": 150.25,
            "orderType": "LIMIT",
            "enteredTime": "2024-03-01T14:30:00+0000",
            "closeTime": "2024-03-01T14:31:00+0000",
            "orderLegCollection": [
                {"instruction": "SELL_SHORT", "instrument": {"symbol": "ABC", "assetType": "EQUITY"}}
            ],
            "orderActivityCollection": [
                {"executionLegs": [
                    {"quantity": 4, "price": 150.0},
                    {"quantity": 6, "price": 150.5}
                ]}
            ]
        });
        let so: OrderResponse = serde_json::from_value(raw.clone()).unwrap();
        let order = map_order(so, raw.to_string());

        assert_eq!(order.id, "1001");
        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(order.action, OrderAction::Sell);
        assert_eq!(order.order_type, OrderType::Limit);
        assert_eq!(order.limit_price, Some(dec!(150.25)));
        assert_eq!(order.filled_price, dec!(150.3));
        assert!(order.submitted_at.is_some());
        assert!(order.filled_at.is_some());
        assert!(order.raw_response.contains("1001"));
    }

    #[test]
    fn test_map_order_tolerates_sparse_payload() {
        let so: OrderResponse = serde_json::from_value(serde_json::json!({
            "status": "QUEUED",
            "orderType": "STOP",
            "enteredTime": "not a time"
        }))
        .unwrap();
        let order = map_order(so, String::new());

        assert_eq!(order.id, "");
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.order_type, OrderType::Market);
        assert_eq!(order.submitted_at, None);
        assert_eq!(order.filled_price, Decimal::ZERO);
    }

    fn order_response(value: serde_json::Value) -> OrderResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_fill_price_falls_back_to_order_price() {
        let so = order_response(serde_json::json!({
            "orderId": 7,
            "status": "WORKING",
            "orderType": "LIMIT",
            "quantity": 10,
            "filledQuantity": 4,
            "price": 99.5
        }));
        let order = map_order(so, String::new());

        assert_eq!(order.filled_price, dec!(99.5));
        assert_eq!(order.filled_quantity, dec!(4));
        assert_eq!(order.filled_at, None);
    }

    #[test]
    fn test_unfilled_order_has_zero_fill_price() {
        let so = order_response(serde_json::json!({
            "orderId": 8,
            "status": "WORKING",
            "orderType": "LIMIT",
            "quantity": 10,
            "filledQuantity": 0,
            "price": 99.5
        }));
        let order = map_order(so, String::new());

        assert_eq!(order.filled_price, Decimal::ZERO);
        assert_eq!(order.limit_price, Some(dec!(99.5)));
    }

    #[test]
    fn test_overflowing_executions_fall_back_to_order_price() {
        let so = order_response(serde_json::json!({
            "orderId": 9,
            "status": "FILLED",
            "orderType": "MARKET",
            "quantity": 2,
            "filledQuantity": 2,
            "price": 12.5,
            "orderActivityCollection": [
                {"executionLegs": [
                    {"quantity": "70000000000000000000000000000", "price": "70000000000000000000000000000"}
                ]}
            ]
        }));
        let order = map_order(so, String::new());

        assert_eq!(order.filled_price, dec!(12.5));
    }

    #[test]
    fn test_account_without_positions_maps_to_empty() {
        let envelope: AccountEnvelope = serde_json::from_value(serde_json::json!({
            "securitiesAccount": {"accountNumber": "1", "type": "CASH", "accountId": "H1"}
        }))
        .unwrap();
        assert!(envelope.securities_account.positions.is_empty());

        let envelope: AccountEnvelope = serde_json::from_value(serde_json::json!({
            "securitiesAccount": {"accountId": "H1", "positions": []}
        }))
        .unwrap();
        let positions: Vec<Position> = envelope
            .securities_account
            .positions
            .into_iter()
            .map(map_position)
            .collect();
        assert!(positions.is_empty());
    }
}
