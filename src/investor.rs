//! Investor view over a brokerage: portfolio totals across accounts.

use std::fmt;
use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::debug;

use crate::brokerage::Brokerage;
use crate::error::Result;
use crate::models::{Account, Position};

/// One account with its positions.
#[derive(Debug, Clone)]
pub struct AccountHoldings {
    pub account: Account,
    pub positions: Vec<Position>,
}

impl AccountHoldings {
    pub fn unrealized_pl(&self) -> Decimal {
        total(self.positions.iter().map(|p| p.unrealized_pl))
    }
}

/// Totals across every account the brokerage exposes.
#[derive(Debug, Clone)]
pub struct PortfolioSummary {
    pub brokerage: String,
    pub accounts: Vec<AccountHoldings>,
    pub total_value: Decimal,
    pub total_cash: Decimal,
    pub total_unrealized_pl: Decimal,
}

impl fmt::Display for PortfolioSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Portfolio ({}) ===", self.brokerage)?;
        writeln!(f, "Accounts:         {}", self.accounts.len())?;
        writeln!(f, "Total Value:      ${:.2}", self.total_value)?;
        writeln!(f, "Cash:             ${:.2}", self.total_cash)?;
        writeln!(f, "Unrealized P&L:   ${:.2}", self.total_unrealized_pl)?;

        for holdings in &self.accounts {
            writeln!(
                f,
                "\n--- {} {} (${:.2}) ---",
                holdings.account.account_type,
                holdings.account.account_number,
                holdings.account.total_value
            )?;
            for pos in &holdings.positions {
                writeln!(
                    f,
                    "  {:<8} {:>10} @ {:>10.2} -> {:>10.2} ({:+.2}%)",
                    pos.symbol,
                    pos.quantity,
                    pos.average_price,
                    pos.current_price,
                    pos.unrealized_pl_pct
                )?;
            }
        }
        Ok(())
    }
}

fn total(values: impl Iterator<Item = Decimal>) -> Decimal {
    values.fold(Decimal::ZERO, Decimal::saturating_add)
}

/// An investor holding a brokerage only through the trait.
pub struct Investor {
    brokerage: Arc<dyn Brokerage>,
}

impl Investor {
    pub fn new(brokerage: Arc<dyn Brokerage>) -> Self {
        Self { brokerage }
    }

    /// Fetch every account and its positions and total them up.
    ///
    /// An expired but refreshable credential is renewed by the first call;
    /// `NotAuthenticated` surfaces only when no credential can be used.
    pub async fn portfolio_summary(&self) -> Result<PortfolioSummary> {
        let accounts = self.brokerage.get_accounts().await?;
        let mut holdings = Vec::with_capacity(accounts.len());

        for account in accounts {
            let positions = self.brokerage.get_positions(&account.account_id).await?;
            debug!(
                account = %account.account_number,
                positions = positions.len(),
                "Loaded holdings"
            );
            holdings.push(AccountHoldings { account, positions });
        }

        Ok(PortfolioSummary {
            brokerage: self.brokerage.name().to_string(),
            total_value: total(holdings.iter().map(|h| h.account.total_value)),
            total_cash: total(holdings.iter().map(|h| h.account.cash_balance)),
            total_unrealized_pl: total(holdings.iter().map(|h| h.unrealized_pl())),
            accounts: holdings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BrokerageError;
    use crate::models::{Order, OrderRequest, Quote};
    use async_trait::async_trait;
    use rust_decimal_macros::dec;

    struct FakeBrokerage {
        authenticated: bool,
    }

    #[async_trait]
    impl Brokerage for FakeBrokerage {
        fn is_authenticated(&self) -> bool {
            self.authenticated
        }

        async fn get_accounts(&self) -> Result<Vec<Account>> {
            if !self.authenticated {
                return Err(BrokerageError::NotAuthenticated);
            }
            Ok(vec![
                Account::new("A".into(), "1".into(), "CASH".into(), dec!(100), dec!(100), dec!(900)),
                Account::new("B".into(), "2".into(), "MARGIN".into(), dec!(50), dec!(80), dec!(0)),
            ])
        }

        async fn get_positions(&self, account_id: &str) -> Result<Vec<Position>> {
            match account_id {
                "A" => Ok(vec![Position::from_holdings(
                    "ABC".into(),
                    dec!(9),
                    dec!(0),
                    dec!(90),
                    dec!(900),
                )]),
                _ => Ok(vec![]),
            }
        }

        async fn place_order(&self, _: &str, _: &OrderRequest) -> Result<Order> {
            unimplemented!()
        }

        async fn get_order_status(&self, _: &str, _: &str) -> Result<Order> {
            unimplemented!()
        }

        async fn cancel_pending_order(&self, _: &str, _: &str) -> Result<()> {
            unimplemented!()
        }

        async fn get_recent_orders(&self, _: &str, _: u32) -> Result<Vec<Order>> {
            unimplemented!()
        }

        async fn get_quote(&self, _: &str) -> Result<Quote> {
            unimplemented!()
        }

        fn name(&self) -> &str {
            "fake"
        }
    }

    #[tokio::test]
    async fn test_portfolio_summary_totals() {
        let investor = Investor::new(Arc::new(FakeBrokerage { authenticated: true }));
        let summary = investor.portfolio_summary().await.unwrap();

        assert_eq!(summary.accounts.len(), 2);
        assert_eq!(summary.total_value, dec!(1050));
        assert_eq!(summary.total_cash, dec!(150));
        assert_eq!(summary.total_unrealized_pl, dec!(90));
        assert!(summary.to_string().contains("ABC"));
    }

    #[tokio::test]
    async fn test_brokerage_error_propagates() {
        let investor = Investor::new(Arc::new(FakeBrokerage { authenticated: false }));
        assert!(matches!(
            investor.portfolio_summary().await,
            Err(BrokerageError::NotAuthenticated)
        ));
    }
}
