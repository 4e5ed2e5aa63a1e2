//! OAuth credential: the access/refresh token pair plus its derived expiry.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Token endpoint response body.
#[derive(Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_in: i64,
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub scope: String,
}

impl std::fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_in", &self.expires_in)
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .finish()
    }
}

/// OAuth credential as held in memory and persisted to disk.
///
/// `expires_at` is stamped once at issuance from `expires_in` and is not
/// otherwise mutable; build a new credential to change it.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    access_token: String,
    #[serde(default)]
    refresh_token: String,
    expires_in: i64,
    #[serde(default)]
    token_type: String,
    #[serde(default)]
    scope: String,
    expires_at: DateTime<Utc>,
}

impl Credential {
    /// Issue a credential from a token response received at `issued_at`.
    pub fn issue(response: TokenResponse, issued_at: DateTime<Utc>) -> Self {
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token.unwrap_or_default(),
            expires_at: issued_at + Duration::seconds(response.expires_in),
            expires_in: response.expires_in,
            token_type: response.token_type,
            scope: response.scope,
        }
    }

    /// Issue a refreshed credential, keeping the old refresh token when the
    /// endpoint did not rotate it.
    pub fn reissue(&self, response: TokenResponse, issued_at: DateTime<Utc>) -> Self {
        let mut next = Self::issue(response, issued_at);
        if next.refresh_token.is_empty() {
            next.refresh_token = self.refresh_token.clone();
        }
        next
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// Refresh token, if one was issued.
    pub fn refresh_token(&self) -> Option<&str> {
        if self.refresh_token.is_empty() {
            None
        } else {
            Some(&self.refresh_token)
        }
    }

    pub fn token_type(&self) -> &str {
        &self.token_type
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn expires_in(&self) -> i64 {
        self.expires_in
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Valid iff `now < expires_at`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    /// True once `now + window` reaches the expiry instant.
    pub fn needs_refresh_at(&self, now: DateTime<Utc>, window: Duration) -> bool {
        now + window >= self.expires_at
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token().map(|_| "<redacted>"))
            .field("expires_in", &self.expires_in)
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn response(expires_in: i64, refresh: Option<&str>) -> TokenResponse {
        TokenResponse {
            access_token: "access-1".to_string(),
            refresh_token: refresh.map(str::to_string),
            expires_in,
            token_type: "Bearer".to_string(),
            scope: "api".to_string(),
        }
    }

    #[test]
    fn test_expiry_is_derived_from_issue_time() {
        let t = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let cred = Credential::issue(response(1800, Some("refresh-1")), t);

        assert_eq!(cred.expires_at(), t + Duration::seconds(1800));
        assert!(cred.is_valid_at(t + Duration::seconds(1799)));
        assert!(!cred.is_valid_at(t + Duration::seconds(1800)));
    }

    #[test]
    fn test_safety_window() {
        let t = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let cred = Credential::issue(response(1800, Some("refresh-1")), t);
        let window = Duration::minutes(5);

        assert!(cred.needs_refresh_at(t + Duration::seconds(1796), window));
        assert!(cred.needs_refresh_at(t + Duration::seconds(1500), window));
        assert!(!cred.needs_refresh_at(t + Duration::seconds(1000), window));
    }

    #[test]
    fn test_reissue_keeps_refresh_token_when_not_rotated() {
        let t = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let cred = Credential::issue(response(1800, Some("refresh-1")), t);
        let next = cred.reissue(response(1800, None), t + Duration::seconds(1700));

        assert_eq!(next.refresh_token(), Some("refresh-1"));
        assert_eq!(next.expires_at(), t + Duration::seconds(3500));
    }

    #[test]
    fn test_missing_refresh_token() {
        let cred = Credential::issue(response(60, None), Utc::now());
        assert_eq!(cred.refresh_token(), None);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let cred = Credential::issue(response(60, Some("refresh-1")), Utc::now());
        let rendered = format!("{:?}", cred);
        assert!(!rendered.contains("access-1"));
        assert!(!rendered.contains("refresh-1"));
    }
}
