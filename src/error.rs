//! Error types shared by the OAuth session, transport and brokerage adapters.

use thiserror::Error;

/// Result alias used across the library.
pub type Result<T> = std::result::Result<T, BrokerageError>;

/// Errors raised while authenticating or talking to a brokerage.
#[derive(Debug, Error)]
pub enum BrokerageError {
    /// Local configuration is missing or malformed.
    #[error("Config error: {0}")]
    Config(String),

    /// The token endpoint rejected the authorization code.
    #[error("Authorization code exchange failed ({status}): {body}")]
    AuthExchange {
        /// HTTP status returned by the token endpoint.
        status: u16,
        /// Raw response body or parse failure description.
        body: String,
    },

    /// A refresh was requested but no refresh token is stored.
    #[error("No refresh token available")]
    NoRefreshToken,

    /// The token endpoint rejected the refresh token.
    #[error("Token refresh failed ({status}): {body}")]
    Refresh {
        /// HTTP status returned by the token endpoint.
        status: u16,
        /// Raw response body or parse failure description.
        body: String,
    },

    /// Pre-emptive refresh failed before a business call; no request was sent.
    #[error("Failed to refresh token: {0}")]
    RefreshFailed(#[source] Box<BrokerageError>),

    /// No valid credential at call time; nothing was sent.
    #[error("Not authenticated")]
    NotAuthenticated,

    /// A business endpoint answered with a non-2xx status.
    #[error("Vendor API error ({status}): {body}")]
    VendorApi {
        /// HTTP status code.
        status: u16,
        /// Raw response body.
        body: String,
    },

    /// The vendor returned JSON that does not match the expected schema.
    #[error("Failed to parse {context} response: {source}")]
    ResponseParse {
        /// Which response was being decoded.
        context: &'static str,
        /// Underlying decode error.
        #[source]
        source: serde_json::Error,
    },

    /// Network or protocol failure before a status was received.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// No credential has been persisted yet.
    #[error("No stored credential at {0}")]
    CredentialNotFound(String),

    /// Reading or writing the credential file failed.
    #[error("Credential storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// The order request failed local validation.
    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    /// The interactive authorization callback never arrived.
    #[error("Timed out waiting for authorization callback")]
    CallbackTimeout,
}

impl BrokerageError {
    /// Wrap a decode failure for the named response.
    pub fn parse(context: &'static str, source: serde_json::Error) -> Self {
        Self::ResponseParse { context, source }
    }

    /// True when the caller has to run the authorization-code flow again.
    pub fn requires_reauthentication(&self) -> bool {
        match self {
            Self::NotAuthenticated
            | Self::NoRefreshToken
            | Self::Refresh { .. }
            | Self::AuthExchange { .. } => true,
            Self::RefreshFailed(inner) => inner.requires_reauthentication(),
            Self::VendorApi { status, .. } => *status == 401,
            _ => false,
        }
    }
}
