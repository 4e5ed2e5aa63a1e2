//! Brokerage client with an OAuth2 token lifecycle.
//!
//! Credentials are acquired once through the authorization-code flow,
//! persisted, and refreshed silently shortly before they expire. Brokerage
//! access goes through the vendor-neutral [`Brokerage`] trait; [`SchwabClient`]
//! is the Schwab Trader API adapter.

pub mod api;
pub mod brokerage;
pub mod config;
pub mod error;
pub mod investor;
pub mod models;
pub mod oauth;

pub use api::SchwabClient;
pub use brokerage::Brokerage;
pub use config::BrokerConfig;
pub use error::{BrokerageError, Result};
pub use investor::{Investor, PortfolioSummary};
