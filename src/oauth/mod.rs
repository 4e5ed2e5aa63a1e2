//! OAuth token lifecycle: credential, persistence, session, authenticated transport.
//!
//! Credential flow:
//! 1. `OAuthSession::authorize_url()` is opened in a browser
//! 2. The redirect's `code` arrives through `CallbackListener` (or by hand)
//! 3. `OAuthSession::exchange_code()` issues and persists a `Credential`
//! 4. `AuthenticatedTransport::send()` refreshes it shortly before expiry

mod callback;
mod credential;
mod session;
mod store;
mod transport;

pub use callback::{extract_code, CallbackListener};
pub use credential::{Credential, TokenResponse};
pub use session::{OAuthConfig, OAuthSession};
pub use store::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use transport::{AuthenticatedTransport, REFRESH_SAFETY_WINDOW_SECS};
