//! Authenticated transport: every business API call goes through here.

use std::sync::Arc;

use chrono::Duration;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, Response};
use serde::Serialize;
use tracing::debug;

use crate::error::{BrokerageError, Result};

use super::OAuthSession;

/// Lead time before expiry at which a refresh is attempted.
pub const REFRESH_SAFETY_WINDOW_SECS: i64 = 300;

/// Sends bearer-authenticated requests, refreshing the credential first when
/// it is inside the safety window. Never retries.
#[derive(Clone)]
pub struct AuthenticatedTransport {
    http: Client,
    session: Arc<OAuthSession>,
    base_url: String,
    safety_window: Duration,
}

impl AuthenticatedTransport {
    pub fn new(http: Client, session: Arc<OAuthSession>, base_url: impl Into<String>) -> Self {
        Self {
            http,
            session,
            base_url: base_url.into(),
            safety_window: Duration::seconds(REFRESH_SAFETY_WINDOW_SECS),
        }
    }

    pub fn session(&self) -> &Arc<OAuthSession> {
        &self.session
    }

    /// Send `method base_url+path` with an optional JSON body.
    ///
    /// The raw response is returned whatever its status; interpreting it is
    /// the adapter's job.
    pub async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Response> {
        self.session
            .ensure_fresh(self.safety_window)
            .await
            .map_err(|e| BrokerageError::RefreshFailed(Box::new(e)))?;

        let token = self
            .session
            .access_token()
            .ok_or(BrokerageError::NotAuthenticated)?;

        let url = format!("{}{}", self.base_url, path);
        debug!(method = %method, url = %url, "Sending request");

        let mut request = self
            .http
            .request(method, &url)
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .header(CONTENT_TYPE, "application/json");

        if let Some(body) = body {
            let bytes = serde_json::to_vec(body).map_err(|e| BrokerageError::parse("request", e))?;
            request = request.body(bytes);
        }

        Ok(request.send().await?)
    }

    pub async fn get(&self, path: &str) -> Result<Response> {
        self.send::<()>(Method::GET, path, None).await
    }

    pub async fn delete(&self, path: &str) -> Result<Response> {
        self.send::<()>(Method::DELETE, path, None).await
    }

    pub async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Response> {
        self.send(Method::POST, path, Some(body)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth::{Credential, MemoryCredentialStore, OAuthConfig};
    use chrono::Utc;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn credential(issued_secs_ago: i64, refresh: Option<&str>) -> Credential {
        let mut body = serde_json::json!({
            "access_token": "a1",
            "expires_in": 1800,
            "token_type": "Bearer",
            "scope": "api",
        });
        if let Some(r) = refresh {
            body["refresh_token"] = serde_json::Value::String(r.to_string());
        }
        Credential::issue(
            serde_json::from_value(body).unwrap(),
            Utc::now() - Duration::seconds(issued_secs_ago),
        )
    }

    fn transport(server: &MockServer, credential: Option<Credential>) -> AuthenticatedTransport {
        let store = match credential {
            Some(c) => MemoryCredentialStore::with_credential(c),
            None => MemoryCredentialStore::new(),
        };
        let session = OAuthSession::new(
            OAuthConfig {
                client_id: "id".to_string(),
                client_secret: "secret".to_string(),
                redirect_uri: "https://127.0.0.1/cb".to_string(),
                auth_url: format!("{}/v1/oauth/authorize", server.uri()),
                token_url: format!("{}/v1/oauth/token", server.uri()),
            },
            Client::new(),
            Arc::new(store),
        );
        session.restore().unwrap();
        AuthenticatedTransport::new(Client::new(), Arc::new(session), server.uri())
    }

    async fn mount_token(server: &MockServer, expected: u64) {
        Mock::given(method("POST"))
            .and(path("/v1/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "a2",
                "refresh_token": "r2",
                "expires_in": 1800,
                "token_type": "Bearer",
                "scope": "api",
            })))
            .expect(expected)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_fresh_credential_does_not_refresh() {
        let server = MockServer::start().await;
        mount_token(&server, 0).await;
        Mock::given(method("GET"))
            .and(path("/ping"))
            .and(header("authorization", "Bearer a1"))
            .and(header("content-type", "application/json"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        // T+1000 of an 1800s token
        let t = transport(&server, Some(credential(1000, Some("r1"))));
        let resp = t.get("/ping").await.unwrap();
        assert_eq!(resp.status(), 200);
    }

    #[tokio::test]
    async fn test_refreshes_inside_safety_window() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;
        Mock::given(method("GET"))
            .and(path("/ping"))
            .and(header("authorization", "Bearer a2"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        // T+1796 of an 1800s token
        let t = transport(&server, Some(credential(1796, Some("r1"))));
        t.get("/ping").await.unwrap();
    }

    #[tokio::test]
    async fn test_refresh_failure_skips_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let t = transport(&server, Some(credential(1796, None)));
        let err = t.get("/ping").await.unwrap_err();

        assert!(matches!(
            err,
            BrokerageError::RefreshFailed(ref inner) if matches!(**inner, BrokerageError::NoRefreshToken)
        ));
    }

    #[tokio::test]
    async fn test_no_credential_is_not_authenticated() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let t = transport(&server, None);
        assert!(matches!(
            t.get("/ping").await,
            Err(BrokerageError::NotAuthenticated)
        ));
    }

    #[tokio::test]
    async fn test_non_success_status_is_returned_raw() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("down"))
            .expect(1)
            .mount(&server)
            .await;

        let t = transport(&server, Some(credential(10, Some("r1"))));
        let resp = t.get("/ping").await.unwrap();
        assert_eq!(resp.status(), 503);
    }
}
