//! OAuth session: authorization-code and refresh-token exchanges.
//!
//! The session is the single owner of the live credential. Every change is
//! mirrored to the credential store. Refreshes are serialized so concurrent
//! callers never spend the same refresh token twice.

use std::sync::{Arc, RwLock};

use chrono::{Duration, Utc};
use reqwest::{Client, StatusCode};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{BrokerageError, Result};

use super::{Credential, CredentialStore, TokenResponse};

/// OAuth client registration and endpoints.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub auth_url: String,
    pub token_url: String,
}

/// Which token grant a request is for; selects the error variant on failure.
#[derive(Debug, Clone, Copy)]
enum Grant {
    AuthorizationCode,
    RefreshToken,
}

impl Grant {
    fn error(self, status: u16, body: String) -> BrokerageError {
        match self {
            Grant::AuthorizationCode => BrokerageError::AuthExchange { status, body },
            Grant::RefreshToken => BrokerageError::Refresh { status, body },
        }
    }
}

/// Authenticated session for one brokerage login.
pub struct OAuthSession {
    config: OAuthConfig,
    http: Client,
    store: Arc<dyn CredentialStore>,
    credential: RwLock<Option<Credential>>,
    refresh_lock: Mutex<()>,
}

impl OAuthSession {
    pub fn new(config: OAuthConfig, http: Client, store: Arc<dyn CredentialStore>) -> Self {
        Self {
            config,
            http,
            store,
            credential: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Load a previously persisted credential.
    ///
    /// Returns false when nothing is stored; the session stays unauthenticated.
    pub fn restore(&self) -> Result<bool> {
        match self.store.load() {
            Ok(credential) => {
                debug!(expires_at = %credential.expires_at(), "Restored stored credential");
                self.set(Some(credential));
                Ok(true)
            }
            Err(BrokerageError::CredentialNotFound(path)) => {
                debug!(path = %path, "No stored credential");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// URL the user visits to grant access. No network call.
    pub fn authorize_url(&self) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code",
            self.config.auth_url,
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(&self.config.redirect_uri),
        )
    }

    /// Exchange an authorization code for a credential, make it current and persist it.
    ///
    /// The credential is installed before saving, so a storage failure is
    /// returned with the session still authenticated.
    pub async fn exchange_code(&self, code: &str) -> Result<()> {
        let _guard = self.refresh_lock.lock().await;

        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
        ];
        let response = self.request_token(Grant::AuthorizationCode, &params).await?;

        let credential = Credential::issue(response, Utc::now());
        info!(expires_at = %credential.expires_at(), "Authorization code exchanged");
        self.set(Some(credential.clone()));
        self.store.save(&credential)?;

        Ok(())
    }

    /// Exchange the stored refresh token for a new credential.
    pub async fn refresh(&self) -> Result<()> {
        let _guard = self.refresh_lock.lock().await;
        self.refresh_locked().await
    }

    /// Refresh if the current credential expires within `window`.
    ///
    /// Waiters that queued behind an in-flight refresh re-check freshness and
    /// skip their own attempt when it already succeeded.
    pub async fn ensure_fresh(&self, window: Duration) -> Result<()> {
        if !self.needs_refresh(window) {
            return Ok(());
        }

        let _guard = self.refresh_lock.lock().await;
        if !self.needs_refresh(window) {
            return Ok(());
        }

        self.refresh_locked().await
    }

    /// True iff a credential exists and has not expired. Evaluated on every call.
    pub fn is_authenticated(&self) -> bool {
        self.current()
            .map(|c| c.is_valid_at(Utc::now()))
            .unwrap_or(false)
    }

    /// Snapshot of the current credential.
    pub fn current(&self) -> Option<Credential> {
        self.credential
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Current access token, if authenticated right now.
    pub fn access_token(&self) -> Option<String> {
        self.current()
            .filter(|c| c.is_valid_at(Utc::now()))
            .map(|c| c.access_token().to_string())
    }

    fn needs_refresh(&self, window: Duration) -> bool {
        self.current()
            .map(|c| c.needs_refresh_at(Utc::now(), window))
            .unwrap_or(false)
    }

    fn set(&self, credential: Option<Credential>) {
        *self.credential.write().unwrap_or_else(|e| e.into_inner()) = credential;
    }

    async fn refresh_locked(&self) -> Result<()> {
        let Some(previous) = self.current() else {
            return Err(BrokerageError::NoRefreshToken);
        };
        let Some(refresh_token) = previous.refresh_token().map(str::to_string) else {
            warn!("Refresh requested without a refresh token");
            self.set(None);
            return Err(BrokerageError::NoRefreshToken);
        };

        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.as_str()),
        ];
        let response = match self.request_token(Grant::RefreshToken, &params).await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "Token refresh failed");
                self.set(None);
                return Err(e);
            }
        };

        // The old refresh token may already be retired; keep the new one even if saving fails.
        let credential = previous.reissue(response, Utc::now());
        info!(expires_at = %credential.expires_at(), "Access token refreshed");
        self.set(Some(credential.clone()));
        if let Err(e) = self.store.save(&credential) {
            warn!(error = %e, "Failed to persist refreshed credential");
        }

        Ok(())
    }

    async fn request_token(&self, grant: Grant, params: &[(&str, &str)]) -> Result<TokenResponse> {
        debug!(url = %self.config.token_url, ?grant, "Requesting token");

        let resp = self
            .http
            .post(&self.config.token_url)
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(params)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;

        if status != StatusCode::OK {
            return Err(grant.error(status.as_u16(), body));
        }

        serde_json::from_str(&body).map_err(|e| {
            grant.error(status.as_u16(), format!("malformed token response: {}", e))
        })
    }
}
