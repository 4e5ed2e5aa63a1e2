//! money-pies CLI
//!
//! Authorize once against the Schwab Trader API, then query accounts,
//! positions, orders and quotes, and place or cancel trades.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rust_decimal::Decimal;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use money_pies::models::{Order, OrderAction, OrderRequest, OrderType};
use money_pies::oauth::CallbackListener;
use money_pies::{BrokerConfig, Brokerage, Investor, SchwabClient};

/// Brokerage CLI with silent OAuth token refresh.
#[derive(Parser)]
#[command(name = "money-pies")]
#[command(about = "Query and trade a brokerage account over OAuth", long_about = None)]
struct Cli {
    /// Client config JSON (defaults to $SCHWAB_CLIENT_CONFIG or $CONFIG_FILE_LOCATION)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the authorization-code flow and store the credential
    Auth {
        /// Authorization code copied from the redirect URL (skips the listener)
        #[arg(long)]
        code: Option<String>,

        /// Address for the local redirect listener
        #[arg(long, default_value = "127.0.0.1:8080")]
        listen: String,

        /// Seconds to wait for the redirect
        #[arg(long, default_value = "300")]
        timeout: u64,
    },

    /// Show whether a valid credential is stored
    Status,

    /// List accounts and balances
    Accounts,

    /// List positions for an account
    Positions {
        /// Account id (hash)
        account: String,
    },

    /// Fetch a quote
    Quote {
        symbol: String,
    },

    /// List recent orders for an account
    Orders {
        account: String,

        /// Maximum number of orders
        #[arg(short, long, default_value = "20")]
        limit: u32,
    },

    /// Show one order
    Order {
        account: String,
        order_id: String,
    },

    /// Place an order
    Place {
        account: String,

        #[arg(short, long)]
        symbol: String,

        #[arg(short, long, value_enum)]
        action: ActionArg,

        #[arg(short = 't', long = "type", value_enum, default_value = "market")]
        order_type: TypeArg,

        #[arg(short, long)]
        quantity: Decimal,

        /// Limit price (required for limit orders)
        #[arg(short, long)]
        price: Option<Decimal>,
    },

    /// Cancel a pending order
    Cancel {
        account: String,
        order_id: String,
    },

    /// Portfolio totals across all accounts
    Summary,
}

#[derive(Clone, Copy, ValueEnum)]
enum ActionArg {
    Buy,
    Sell,
}

#[derive(Clone, Copy, ValueEnum)]
enum TypeArg {
    Market,
    Limit,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = match &cli.config {
        Some(path) => BrokerConfig::from_file(path),
        None => BrokerConfig::from_env(),
    }
    .context("Failed to load client config")?;

    let client = Arc::new(SchwabClient::from_config(&config).context("Failed to create client")?);

    match cli.command {
        Commands::Auth {
            code,
            listen,
            timeout,
        } => {
            let session = client.session();
            if session.is_authenticated() {
                println!("Already authenticated.");
                return Ok(());
            }

            let code = match code {
                Some(code) => code,
                None => {
                    let listener = CallbackListener::bind(&listen)
                        .await
                        .with_context(|| format!("Failed to bind callback listener on {}", listen))?;

                    println!("Please visit the following URL to authorize the application:");
                    println!("\n  {}\n", session.authorize_url());
                    println!("Waiting for the redirect on http://{} ...", listen);
                    println!("(If the redirect cannot reach this listener, rerun with --code <CODE>.)");

                    listener
                        .wait_for_code(Duration::from_secs(timeout))
                        .await
                        .context("No authorization code received")?
                }
            };

            session
                .exchange_code(&code)
                .await
                .context("Failed to get access token")?;

            if !session.is_authenticated() {
                anyhow::bail!("Failed to authenticate");
            }
            info!(token_file = %config.token_file.display(), "OAuth flow complete");
            println!("OAuth2.0 flow complete.");
        }

        Commands::Status => match client.session().current() {
            Some(credential) if client.is_authenticated() => {
                println!("Authenticated (access token expires {}).", credential.expires_at());
                println!(
                    "Refresh token:    {}",
                    if credential.refresh_token().is_some() { "present" } else { "missing" }
                );
            }
            Some(credential) => {
                println!("Access token expired at {}.", credential.expires_at());
                println!("The next API call will try a refresh; run 'money-pies auth' if it fails.");
            }
            None => println!("Not authenticated. Run 'money-pies auth'."),
        },

        Commands::Accounts => {
            let accounts = client.get_accounts().await?;

            println!(
                "\n{:<20} {:<12} {:<8} {:>14} {:>14} {:>14}",
                "ACCOUNT ID", "NUMBER", "TYPE", "CASH", "BUYING POWER", "TOTAL"
            );
            println!("{}", "-".repeat(87));
            for a in accounts {
                println!(
                    "{:<20} {:<12} {:<8} {:>14.2} {:>14.2} {:>14.2}",
                    truncate(&a.account_id, 20),
                    a.account_number,
                    a.account_type,
                    a.cash_balance,
                    a.buying_power,
                    a.total_value
                );
            }
        }

        Commands::Positions { account } => {
            let positions = client.get_positions(&account).await?;
            if positions.is_empty() {
                println!("No open positions.");
                return Ok(());
            }

            println!(
                "\n{:<8} {:>10} {:>10} {:>10} {:>12} {:>12} {:>8}",
                "SYMBOL", "QTY", "AVG", "PRICE", "VALUE", "P&L", "P&L%"
            );
            println!("{}", "-".repeat(76));
            for p in positions {
                println!(
                    "{:<8} {:>10} {:>10.2} {:>10.2} {:>12.2} {:>12.2} {:>7.2}%",
                    p.symbol,
                    p.quantity,
                    p.average_price,
                    p.current_price,
                    p.market_value,
                    p.unrealized_pl,
                    p.unrealized_pl_pct
                );
            }
        }

        Commands::Quote { symbol } => {
            let quote = client.get_quote(&symbol).await?;
            println!("{}", serde_json::to_string_pretty(&quote)?);
        }

        Commands::Orders { account, limit } => {
            let orders = client.get_recent_orders(&account, limit).await?;
            if orders.is_empty() {
                println!("No recent orders.");
                return Ok(());
            }

            println!(
                "\n{:<14} {:<8} {:<5} {:<7} {:>8} {:>8} {:<10} {}",
                "ORDER ID", "SYMBOL", "SIDE", "TYPE", "QTY", "FILLED", "STATUS", "ENTERED"
            );
            println!("{}", "-".repeat(90));
            for o in &orders {
                print_order_row(o);
            }
        }

        Commands::Order { account, order_id } => {
            let order = client.get_order_status(&account, &order_id).await?;
            print_order(&order);
        }

        Commands::Place {
            account,
            symbol,
            action,
            order_type,
            quantity,
            price,
        } => {
            let action = match action {
                ActionArg::Buy => OrderAction::Buy,
                ActionArg::Sell => OrderAction::Sell,
            };
            let request = OrderRequest {
                symbol,
                action,
                order_type: match order_type {
                    TypeArg::Market => OrderType::Market,
                    TypeArg::Limit => OrderType::Limit,
                },
                quantity,
                limit_price: price,
            };

            let order = client.place_order(&account, &request).await?;
            if order.id.is_empty() {
                println!("Order accepted, but the brokerage returned no order id.");
                println!("Use 'money-pies orders {}' to find it.", account);
            }
            print_order(&order);
        }

        Commands::Cancel { account, order_id } => {
            client.cancel_pending_order(&account, &order_id).await?;
            println!("Cancelled order {}", order_id);
        }

        Commands::Summary => {
            let investor = Investor::new(client.clone());
            let summary = investor.portfolio_summary().await?;
            println!("\n{}", summary);
        }
    }

    Ok(())
}

fn print_order_row(o: &Order) {
    println!(
        "{:<14} {:<8} {:<5} {:<7} {:>8} {:>8} {:<10} {}",
        truncate(&o.id, 14),
        o.symbol,
        o.action.as_str(),
        o.order_type.as_str(),
        o.quantity,
        o.filled_quantity,
        o.status,
        o.submitted_at
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string())
    );
}

fn print_order(o: &Order) {
    println!("\n=== Order {} ===", if o.id.is_empty() { "(unknown id)" } else { &o.id });
    println!("Symbol:       {}", o.symbol);
    println!("Action:       {}", o.action.as_str());
    println!("Type:         {}", o.order_type.as_str());
    println!("Quantity:     {}", o.quantity);
    if let Some(price) = o.limit_price {
        println!("Limit Price:  {:.2}", price);
    }
    println!("Status:       {}", o.status);
    println!("Filled:       {} @ {:.2}", o.filled_quantity, o.filled_price);
    if let Some(t) = o.submitted_at {
        println!("Submitted:    {}", t);
    }
    if let Some(t) = o.filled_at {
        println!("Filled At:    {}", t);
    }
}

/// Truncate a string with ellipsis if too long, counting chars rather than bytes.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
