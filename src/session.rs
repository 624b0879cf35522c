use chrono::Utc;
use log::debug;
use serde_json::json;

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::request::ApiRequest;
use crate::token::{TokenKind, TokenRecord, TokenStore};

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Owns the token acquisition/refresh policy: decides when a cached token
/// is still valid versus must be fetched or refreshed, and hands out
/// pre-authorized [`ApiRequest`]s for the service API.
pub struct SessionManager {
    config: ClientConfig,
    store: Box<dyn TokenStore>,
    http: reqwest::Client,
}

impl SessionManager {
    pub fn new(config: ClientConfig, store: Box<dyn TokenStore>) -> Self {
        Self {
            config,
            store,
            http: reqwest::Client::new(),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The authorization-code redirect URL to send the user to.
    pub fn login_redirect_url(&self) -> String {
        format!(
            "{}/oauth/authorize?response_type=code&client_id={}",
            self.config.api_base_url, self.config.client_id
        )
    }

    /// Exchange an authorization code for an access token, persist the
    /// record and return the bare token string.
    pub async fn complete_login(&self, code: &str) -> Result<String> {
        let payload = ApiRequest::new(
            self.http.clone(),
            self.config.access_token_url.clone(),
            None,
        )
        .get(Some(&json!({ "code": code })))
        .await?;

        let record = TokenRecord::from_payload(&payload, now_ms())?;
        self.store.set(TokenKind::Access, &record)?;

        debug!("Login completed, access token valid for {}s", record.expires_in);
        Ok(record.access_token)
    }

    /// True iff an access record exists and has not expired. Never
    /// triggers network I/O.
    pub fn is_access_token_valid(&self) -> bool {
        self.store
            .get(TokenKind::Access)
            .map(|record| record.is_valid_at(now_ms()))
            .unwrap_or(false)
    }

    /// The stored access record verbatim, even if expired. Callers that
    /// need freshness check [`is_access_token_valid`](Self::is_access_token_valid)
    /// separately.
    pub fn access_token_object(&self) -> Option<TokenRecord> {
        self.store.get(TokenKind::Access)
    }

    pub fn access_token(&self) -> Option<String> {
        self.access_token_object().map(|record| record.access_token)
    }

    /// Resolve the guest token, cache-first.
    ///
    /// A non-expired stored record resolves immediately with no network
    /// call; otherwise a fresh token is fetched from the guest endpoint and
    /// persisted. Concurrent callers racing a cold cache may each fetch;
    /// guest-token fetches are idempotent on the server, so the last write
    /// simply wins.
    pub async fn guest_token(&self) -> Result<String> {
        if let Some(record) = self.store.get(TokenKind::Guest) {
            if record.is_valid_at(now_ms()) {
                return Ok(record.access_token);
            }
        }

        let payload = ApiRequest::new(self.http.clone(), self.config.guest_token_url.clone(), None)
            .get(None)
            .await?;

        let record = TokenRecord::from_payload(&payload, now_ms())?;
        self.store.set(TokenKind::Guest, &record)?;

        debug!("Fetched guest token, valid for {}s", record.expires_in);
        Ok(record.access_token)
    }

    /// Extend the current user session via the refresh endpoint.
    ///
    /// Rejects immediately, without network I/O, when no access record is
    /// stored or the stored record carries no refresh token.
    pub async fn refresh_access_token(&self) -> Result<TokenRecord> {
        let current = self.access_token_object().ok_or_else(|| {
            Error::Auth("access token does not exist, you need to login again".to_string())
        })?;
        let refresh_token = current.refresh_token.ok_or_else(|| {
            Error::Auth("stored access token has no refresh token".to_string())
        })?;

        let payload = ApiRequest::new(
            self.http.clone(),
            self.config.refresh_token_url.clone(),
            None,
        )
        .get(Some(&json!({ "refresh_token": refresh_token })))
        .await?;

        let record = TokenRecord::from_payload(&payload, now_ms())?;
        self.store.set(TokenKind::Access, &record)?;

        debug!("Access token refreshed, valid for {}s", record.expires_in);
        Ok(record)
    }

    /// Remove the access record. The guest record is untouched: guest
    /// sessions are independent of user sessions.
    pub fn logout(&self) -> Result<()> {
        self.store.clear(TokenKind::Access)
    }

    /// Build a request for `api_base_url + endpoint` authorized with the
    /// credential of `kind`.
    ///
    /// For the access kind a missing token yields an unauthenticated
    /// request rather than an error; the server-side authorization failure
    /// is the expected signal. For the guest kind the token is resolved via
    /// [`guest_token`](Self::guest_token), fetching if needed.
    pub async fn authenticated_request(
        &self,
        endpoint: &str,
        kind: TokenKind,
    ) -> Result<ApiRequest> {
        let bearer = match kind {
            TokenKind::Access => self.access_token(),
            TokenKind::Guest => Some(self.guest_token().await?),
        };
        Ok(self.api_request(endpoint, bearer))
    }

    /// Synchronous convenience for the common case: a request authorized
    /// with the stored access token, or unauthenticated if none is stored.
    pub fn authorized_api_request(&self, endpoint: &str) -> ApiRequest {
        self.api_request(endpoint, self.access_token())
    }

    fn api_request(&self, endpoint: &str, bearer: Option<String>) -> ApiRequest {
        ApiRequest::new(
            self.http.clone(),
            format!("{}{}", self.config.api_base_url, endpoint),
            bearer.map(|token| format!("Bearer {}", token)),
        )
    }
}
