//! Position model representing current holdings of one security.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Current position in a security, with derived valuation fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Ticker symbol
    pub symbol: String,

    /// Signed quantity (long minus short)
    pub quantity: Decimal,

    /// Average cost basis per share
    pub average_price: Decimal,

    /// Market value divided by quantity
    pub current_price: Decimal,

    /// Current market value
    pub market_value: Decimal,

    /// Market value minus cost basis
    pub unrealized_pl: Decimal,

    /// Unrealized P&L as a percentage of cost basis
    pub unrealized_pl_pct: Decimal,
}

impl Position {
    /// Build a position from raw holdings, deriving price and P&L.
    pub fn from_holdings(
        symbol: String,
        long_quantity: Decimal,
        short_quantity: Decimal,
        average_price: Decimal,
        market_value: Decimal,
    ) -> Self {
        let quantity = long_quantity.saturating_sub(short_quantity);

        // Derived fields fall back to zero when a divisor is zero or the result overflows.
        let current_price = if quantity.is_zero() {
            Decimal::ZERO
        } else {
            market_value.checked_div(quantity).unwrap_or(Decimal::ZERO)
        };

        let cost_basis = average_price.checked_mul(quantity);
        let unrealized_pl = cost_basis
            .and_then(|cost| market_value.checked_sub(cost))
            .unwrap_or(Decimal::ZERO);

        // A zero quantity makes the cost basis zero even with a nonzero average price.
        let unrealized_pl_pct = match cost_basis {
            Some(cost) if !average_price.is_zero() && !cost.is_zero() => unrealized_pl
                .checked_div(cost)
                .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
                .unwrap_or(Decimal::ZERO),
            _ => Decimal::ZERO,
        };

        Self {
            symbol,
            quantity,
            average_price,
            current_price,
            market_value,
            unrealized_pl,
            unrealized_pl_pct,
        }
    }

    /// Total cost basis (average price times quantity), zero on overflow.
    pub fn cost_basis(&self) -> Decimal {
        self.average_price
            .checked_mul(self.quantity)
            .unwrap_or(Decimal::ZERO)
    }

    /// True for net short positions.
    pub fn is_short(&self) -> bool {
        self.quantity.is_sign_negative() && !self.quantity.is_zero()
    }
}
