//! OAuth2 token lifecycle
//!
//! Implements the Authorization Code + PKCE flow against the platform's
//! authorize and token endpoints, plus the periodic refresh-token grant.
//! Credentials are held behind a [`CredentialStore`]; this type is the only
//! writer.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use reqwest::Url;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::auth::credentials::{CredentialStore, Credentials, OAuthSession};
use crate::client::ApiEndpoints;
use crate::error::AuthError;

/// Scopes requested during authorization
pub const OAUTH_SCOPES: &str = "tweet.read tweet.write users.read offline.access";

/// Tokens are refreshed once this much time has passed since the last refresh
pub const REFRESH_INTERVAL_SECS: i64 = 60 * 60;

/// Service-defined access token lifetime; past this the token is stale
pub const TOKEN_TTL_SECS: i64 = 2 * 60 * 60;

const TOKEN_REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(15);

/// Where the store is in the credential lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    /// No client id/secret yet
    Unconfigured,
    /// Client configured but never authorized
    ConfiguredNoToken,
    /// Access token present and within its TTL
    Authorized,
    /// Access token present but past its TTL
    Expired,
}

pub struct TokenStore {
    store: Arc<dyn CredentialStore>,
    http: reqwest::Client,
    endpoints: ApiEndpoints,
    /// Serializes refreshes so concurrent embeddings cannot interleave
    /// partial credential writes
    refresh_lock: tokio::sync::Mutex<()>,
}

impl TokenStore {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        endpoints: ApiEndpoints,
    ) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .timeout(TOKEN_REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            store,
            http,
            endpoints,
            refresh_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Begin the authorization flow.
    ///
    /// Generates a random `state` and a PKCE verifier/challenge pair (S256,
    /// base64url without padding), persists them for the callback, and
    /// returns the URL the user must visit.
    pub fn start_authorization(&self, redirect_uri: &str) -> Result<String, AuthError> {
        let credentials = self.store.load()?;
        if credentials.client_id.is_empty() || credentials.client_secret.is_empty() {
            return Err(AuthError::NotConfigured);
        }

        let state = random_urlsafe(32);
        let code_verifier = random_urlsafe(32);
        let code_challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(code_verifier.as_bytes()));

        self.store.store_session(&OAuthSession {
            state: state.clone(),
            code_verifier,
            code_challenge: code_challenge.clone(),
        })?;

        let url = Url::parse_with_params(
            &self.endpoints.authorize_url,
            &[
                ("response_type", "code"),
                ("client_id", credentials.client_id.as_str()),
                ("redirect_uri", redirect_uri),
                ("scope", OAUTH_SCOPES),
                ("state", state.as_str()),
                ("code_challenge", code_challenge.as_str()),
                ("code_challenge_method", "S256"),
            ],
        )
        .map_err(|e| AuthError::InvalidEndpoint(e.to_string()))?;

        Ok(url.to_string())
    }

    /// Complete the authorization flow with the provider's callback values.
    ///
    /// Rejects before any network call when the returned `state` does not
    /// match the stored one or no PKCE session exists. On success the tokens
    /// are stored and the one-time session is cleared.
    pub async fn complete_authorization(
        &self,
        code: &str,
        state: &str,
        redirect_uri: &str,
    ) -> Result<(), AuthError> {
        let session = self
            .store
            .load_session()?
            .ok_or(AuthError::MissingChallenge)?;
        if state != session.state {
            return Err(AuthError::StateMismatch);
        }

        let mut credentials = self.store.load()?;
        if credentials.client_id.is_empty() || credentials.client_secret.is_empty() {
            return Err(AuthError::NotConfigured);
        }

        let response = self
            .http
            .post(&self.endpoints.token_url)
            .basic_auth(&credentials.client_id, Some(&credentials.client_secret))
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", redirect_uri),
                ("client_id", credentials.client_id.as_str()),
                ("code_verifier", session.code_verifier.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(AuthError::ExchangeRejected(extract_oauth_error(
                &body, status,
            )));
        }

        let tokens: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| AuthError::ExchangeRejected(format!("malformed token response: {}", e)))?;

        credentials.access_token = tokens.access_token;
        if let Some(refresh_token) = tokens.refresh_token {
            credentials.refresh_token = refresh_token;
        }
        credentials.last_refresh_at = chrono::Utc::now().timestamp();
        self.store.store(&credentials)?;

        // One-time use: a replayed callback must fail with MissingChallenge
        self.store.clear_session()?;

        debug!("authorization complete, tokens stored");
        Ok(())
    }

    /// Refresh the access token if the refresh interval has elapsed.
    ///
    /// A failed refresh leaves the existing token in place; a stale but
    /// still valid token may work, and the downstream call fails naturally
    /// otherwise.
    pub async fn ensure_fresh(&self) -> Result<(), AuthError> {
        let _guard = self.refresh_lock.lock().await;

        let credentials = self.store.load()?;
        if credentials.access_token.is_empty() {
            return Ok(());
        }

        let elapsed = chrono::Utc::now().timestamp() - credentials.last_refresh_at;
        if elapsed <= REFRESH_INTERVAL_SECS {
            return Ok(());
        }

        if credentials.refresh_token.is_empty() {
            warn!("token is stale but no refresh token is stored");
            return Ok(());
        }

        match self.refresh(&credentials).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!("token refresh failed, keeping existing token: {}", e);
                Ok(())
            }
        }
    }

    async fn refresh(&self, credentials: &Credentials) -> Result<(), AuthError> {
        let response = self
            .http
            .post(&self.endpoints.token_url)
            .basic_auth(&credentials.client_id, Some(&credentials.client_secret))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", credentials.refresh_token.as_str()),
                ("client_id", credentials.client_id.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(AuthError::ExchangeRejected(extract_oauth_error(
                &body, status,
            )));
        }

        let tokens: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| AuthError::ExchangeRejected(format!("malformed token response: {}", e)))?;

        let mut updated = credentials.clone();
        updated.access_token = tokens.access_token;
        if let Some(refresh_token) = tokens.refresh_token {
            updated.refresh_token = refresh_token;
        }
        updated.last_refresh_at = chrono::Utc::now().timestamp();
        self.store.store(&updated)?;

        debug!("access token refreshed");
        Ok(())
    }

    /// Current access token, for the publish client.
    pub fn access_token(&self) -> Result<String, AuthError> {
        let credentials = self.store.load()?;
        if credentials.access_token.is_empty() {
            return Err(AuthError::NotConfigured);
        }
        Ok(credentials.access_token)
    }

    /// True iff client id, client secret, and access token are all present.
    pub fn is_configured(&self) -> bool {
        self.store
            .load()
            .map(|c| c.is_configured())
            .unwrap_or(false)
    }

    pub fn state(&self) -> TokenState {
        let credentials = match self.store.load() {
            Ok(c) => c,
            Err(_) => return TokenState::Unconfigured,
        };

        if credentials.client_id.is_empty() || credentials.client_secret.is_empty() {
            return TokenState::Unconfigured;
        }
        if credentials.access_token.is_empty() {
            return TokenState::ConfiguredNoToken;
        }

        let elapsed = chrono::Utc::now().timestamp() - credentials.last_refresh_at;
        if elapsed > TOKEN_TTL_SECS {
            TokenState::Expired
        } else {
            TokenState::Authorized
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
}

fn random_urlsafe(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}

/// Pull the provider's error description out of a token endpoint response.
fn extract_oauth_error(body: &str, status: reqwest::StatusCode) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error_description")
                .or_else(|| v.get("error"))
                .and_then(|e| e.as_str())
                .map(|s| s.to_string())
        })
        .unwrap_or_else(|| format!("authorization failed with status {}", status.as_u16()))
}
