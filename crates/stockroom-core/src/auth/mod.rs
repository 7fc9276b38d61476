//! Bearer token acquisition, persistence and local expiry checks.

use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::Deserialize;
use thiserror::Error;

use crate::http::{Network, SyncApiClient, TransportError};
use crate::services::LocalStore;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(&'static str),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Store(#[from] crate::Error),
}

pub type AuthResult<T> = Result<T, AuthError>;

/// Claims read from a token without verifying its signature.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TokenClaims {
    #[serde(default)]
    pub exp: Option<i64>,
    #[serde(default)]
    pub user_id: Option<serde_json::Value>,
}

/// Decode the payload segment of a JWT.
pub fn decode_claims(token: &str) -> Option<TokenClaims> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Whether `token` is unusable at unix time `now`.
///
/// Undecodable tokens and tokens without `exp` count as expired.
pub fn is_expired(token: &str, now: i64) -> bool {
    match decode_claims(token).and_then(|claims| claims.exp) {
        Some(exp) => now >= exp,
        None => true,
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn expires_at(&self) -> Option<i64> {
        decode_claims(&self.0).and_then(|claims| claims.exp)
    }

    pub fn is_expired(&self, now: i64) -> bool {
        is_expired(&self.0, now)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_tuple("AccessToken")
            .field(&"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStatus {
    SignedOut,
    Expired { expires_at: Option<i64> },
    Active { expires_at: i64 },
}

/// Classify a stored credential at unix time `now`.
pub fn token_status(token: Option<&str>, now: i64) -> AuthStatus {
    let Some(token) = token else {
        return AuthStatus::SignedOut;
    };
    match AccessToken::new(token).expires_at() {
        Some(expires_at) if now < expires_at => AuthStatus::Active { expires_at },
        expires_at => AuthStatus::Expired { expires_at },
    }
}

/// Signs in against the sync API and keeps the token in the local store.
pub struct AuthClient<N> {
    api: SyncApiClient<N>,
    store: LocalStore,
}

impl<N: Network> AuthClient<N> {
    pub const fn new(api: SyncApiClient<N>, store: LocalStore) -> Self {
        Self { api, store }
    }

    pub async fn login(&self, username: &str, password: &str) -> AuthResult<AccessToken> {
        if username.trim().is_empty() {
            return Err(AuthError::InvalidCredentials("username is required"));
        }
        if password.is_empty() {
            return Err(AuthError::InvalidCredentials("password is required"));
        }

        let token = self.api.obtain_token(username.trim(), password).await?;
        self.store.set_access_token(&token).await?;
        tracing::info!("Signed in as {}", username.trim());
        Ok(AccessToken::new(token))
    }

    pub async fn status(&self, now: i64) -> AuthResult<AuthStatus> {
        let token = self.store.access_token().await?;
        Ok(token_status(token.as_deref(), now))
    }

    pub async fn logout(&self) -> AuthResult<()> {
        self.store.clear_access_token().await?;
        tracing::info!("Cleared stored access token");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::http::{HttpRequest, HttpResponse};
    use serde_json::json;

    /// Unsigned JWT with the given `exp` claim.
    pub(crate) fn token_with_exp(exp: i64) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let claims = URL_SAFE_NO_PAD.encode(json!({"exp": exp, "user_id": 1}).to_string());
        format!("{header}.{claims}.signature")
    }

    struct TokenServer;

    impl Network for TokenServer {
        async fn send(&self, _request: &HttpRequest) -> Result<HttpResponse, TransportError> {
            HttpResponse::json_body(200, &json!({"access": token_with_exp(2_000)}))
        }
    }

    #[test]
    fn expiry_is_inclusive() {
        let token = token_with_exp(1_000);
        assert!(!is_expired(&token, 999));
        assert!(is_expired(&token, 1_000));
        assert!(is_expired(&token, 1_001));
    }

    #[test]
    fn malformed_tokens_are_expired() {
        assert!(is_expired("", 0));
        assert!(is_expired("not-a-jwt", 0));
        assert!(is_expired("a.%%%.c", 0));

        let no_exp = format!("h.{}.s", URL_SAFE_NO_PAD.encode(br#"{"user_id":1}"#));
        assert!(is_expired(&no_exp, 0));
    }

    #[test]
    fn access_token_debug_redacts() {
        let token = AccessToken::new("secret-value");
        assert!(!format!("{token:?}").contains("secret-value"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn login_status_logout() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let client = AuthClient::new(SyncApiClient::new(TokenServer), store.clone());

        assert_eq!(client.status(0).await.unwrap(), AuthStatus::SignedOut);

        let token = client.login("ann", "pw").await.unwrap();
        assert_eq!(token.expires_at(), Some(2_000));
        assert_eq!(
            client.status(1_000).await.unwrap(),
            AuthStatus::Active { expires_at: 2_000 }
        );
        assert_eq!(
            client.status(2_000).await.unwrap(),
            AuthStatus::Expired {
                expires_at: Some(2_000)
            }
        );

        client.logout().await.unwrap();
        assert!(store.access_token().await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn login_requires_username() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let client = AuthClient::new(SyncApiClient::new(TokenServer), store);
        assert!(matches!(
            client.login("  ", "pw").await,
            Err(AuthError::InvalidCredentials(_))
        ));
    }
}
