//! Bearer credential acquisition and caching.
//!
//! The cached credential lives in the injected [`KeyValueStore`] under
//! [`AUTH_TOKEN_KEY`]. It is trusted until a call made with it fails; there is
//! no expiry tracking. Fresh fetches go through a single-flight guard so that
//! several callers failing at once cause one round trip to the token endpoint.

use std::sync::Arc;

use reqwest::Client;
use serde::Deserialize;
use subtle::ConstantTimeEq;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::storage::{KeyValueStore, AUTH_TOKEN_KEY};

// ---------------------------------------------------------------------------
// Credential
// ---------------------------------------------------------------------------

/// Opaque bearer token. `Debug` never prints the value and equality is
/// constant-time.
#[derive(Clone)]
pub struct Credential(String);

impl Credential {
    pub fn new(value: impl Into<String>) -> Self {
        Credential(value.into())
    }

    /// The raw token, for building headers.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// `Bearer <token>`
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Credential(<{} chars>)", self.0.len())
    }
}

impl PartialEq for Credential {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_bytes().ct_eq(other.0.as_bytes()).into()
    }
}

impl Eq for Credential {}

impl From<String> for Credential {
    fn from(s: String) -> Self {
        Credential(s)
    }
}

impl From<&str> for Credential {
    fn from(s: &str) -> Self {
        Credential(s.to_string())
    }
}

/// Body returned by the token endpoint. Only `jwt` is read.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub jwt: String,
}

// ---------------------------------------------------------------------------
// TokenManager
// ---------------------------------------------------------------------------

pub struct TokenManager {
    client: Client,
    config: Arc<ClientConfig>,
    store: Arc<dyn KeyValueStore>,
    refresh_lock: Mutex<()>,
}

impl TokenManager {
    pub fn new(client: Client, config: Arc<ClientConfig>, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            client,
            config,
            store,
            refresh_lock: Mutex::new(()),
        }
    }

    /// The cached credential, if any.
    pub fn current(&self) -> Result<Option<Credential>> {
        Ok(self
            .store
            .get(AUTH_TOKEN_KEY)?
            .filter(|t| !t.is_empty())
            .map(Credential))
    }

    /// Cached credential, or a freshly fetched one when nothing is cached.
    ///
    /// # Errors
    /// `TokenFetch` when the cache is empty and the token endpoint fails.
    pub async fn resolve(&self) -> Result<Credential> {
        if let Some(cached) = self.current()? {
            debug!("using cached credential");
            return Ok(cached);
        }
        self.refresh(None).await
    }

    /// Fetch a new credential unconditionally and cache it.
    ///
    /// With an override token configured this caches and returns the override
    /// and makes no network call.
    pub async fn fetch_fresh(&self) -> Result<Credential> {
        let _guard = self.refresh_lock.lock().await;
        self.fetch_unlocked().await
    }

    /// Replace `stale` with a fresh credential.
    ///
    /// Callers that were waiting on another refresh get the credential that
    /// refresh stored instead of fetching again. `stale = None` means the
    /// caller never had one.
    pub async fn refresh(&self, stale: Option<&Credential>) -> Result<Credential> {
        let _guard = self.refresh_lock.lock().await;
        if let Some(current) = self.current()? {
            let replaced = stale.map_or(true, |s| *s != current);
            if replaced {
                debug!("credential already refreshed by a concurrent caller");
                return Ok(current);
            }
        }
        self.fetch_unlocked().await
    }

    async fn fetch_unlocked(&self) -> Result<Credential> {
        if let Some(token) = &self.config.override_token {
            debug!("using configured override credential");
            self.store.set(AUTH_TOKEN_KEY, token)?;
            return Ok(Credential::new(token.clone()));
        }

        let url = self.config.token_url();
        debug!(url = %url, "requesting fresh credential");

        let resp = self
            .client
            .get(&url)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .send()
            .await
            .map_err(|e| {
                warn!(url = %url, error = %e, "token endpoint unreachable");
                ClientError::TokenFetch(format!("request to {url} failed: {e}"))
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(url = %url, status = status.as_u16(), "token endpoint rejected request");
            return Err(ClientError::TokenFetch(format!("HTTP {status} from {url}: {body}")));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| ClientError::TokenFetch(format!("reading token body: {e}")))?;
        let parsed: TokenResponse = serde_json::from_slice(&bytes)
            .map_err(|e| ClientError::TokenFetch(format!("malformed token body: {e}")))?;
        if parsed.jwt.is_empty() {
            return Err(ClientError::TokenFetch("token body carried an empty jwt".into()));
        }

        self.store.set(AUTH_TOKEN_KEY, &parsed.jwt)?;
        info!("fetched and cached fresh credential");
        Ok(Credential(parsed.jwt))
    }
}
