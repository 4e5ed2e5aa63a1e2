//! Brokerage account balances.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Account information with balances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Vendor-assigned opaque identifier used in API paths
    pub account_id: String,

    /// Human-readable account number
    pub account_number: String,

    /// Account type tag (e.g. "CASH", "MARGIN")
    pub account_type: String,

    /// Settled cash
    pub cash_balance: Decimal,

    /// Buying power reported by the brokerage
    pub buying_power: Decimal,

    /// Market value of held securities
    pub market_value: Decimal,

    /// Cash balance plus market value
    pub total_value: Decimal,
}

impl Account {
    /// Create an account; `total_value` is always recomputed here.
    pub fn new(
        account_id: String,
        account_number: String,
        account_type: String,
        cash_balance: Decimal,
        buying_power: Decimal,
        market_value: Decimal,
    ) -> Self {
        Self {
            account_id,
            account_number,
            account_type,
            cash_balance,
            buying_power,
            market_value,
            total_value: cash_balance.saturating_add(market_value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_total_value_is_derived() {
        let account = Account::new(
            "HASH1".to_string(),
            "12345678".to_string(),
            "MARGIN".to_string(),
            dec!(1500.25),
            dec!(3000.50),
            dec!(8499.75),
        );

        assert_eq!(account.total_value, dec!(10000.00));
    }

    #[test]
    fn test_total_value_saturates() {
        let account = Account::new(
            "HASH1".to_string(),
            "1".to_string(),
            "CASH".to_string(),
            Decimal::MAX,
            dec!(0),
            dec!(1),
        );

        assert_eq!(account.total_value, Decimal::MAX);
    }
}
