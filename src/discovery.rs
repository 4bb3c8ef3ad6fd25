//! OIDC discovery and JWKS retrieval.

use josekit::jwk::Jwk;
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Error, Result};
use crate::http::or_cancel;

/// Provider metadata from `{issuer}/.well-known/openid-configuration`,
/// cached for the provider's lifetime.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryDocument {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub jwks_uri: String,
    #[serde(default)]
    pub userinfo_endpoint: Option<String>,
    #[serde(default)]
    pub token_endpoint_auth_methods_supported: Option<Vec<String>>,
    #[serde(default)]
    pub scopes_supported: Option<Vec<String>>,
}

impl DiscoveryDocument {
    /// Fetch and decode the discovery document for `issuer`.
    pub(crate) async fn fetch(
        client: &reqwest::Client,
        issuer: &str,
        cancel: &CancellationToken,
    ) -> Result<Self> {
        let well_known = format!(
            "{}/.well-known/openid-configuration",
            issuer.trim_end_matches('/')
        );
        debug!(url = %well_known, "fetching discovery document");
        let resp = or_cancel(cancel, "discovery", client.get(&well_known).send()).await??;
        let resp = resp.error_for_status()?;
        let doc: DiscoveryDocument = resp.json().await?;
        Ok(doc)
    }

    /// Whether the token endpoint takes client credentials over HTTP Basic.
    /// Basic is the OIDC default; form credentials are used only when the
    /// provider advertises `client_secret_post` and not
    /// `client_secret_basic`.
    pub(crate) fn token_auth_uses_basic(&self) -> bool {
        match &self.token_endpoint_auth_methods_supported {
            Some(methods) if !methods.is_empty() => {
                methods.iter().any(|m| m == "client_secret_basic")
                    || !methods.iter().any(|m| m == "client_secret_post")
            }
            _ => true,
        }
    }
}

struct JwksState {
    keys: Vec<Jwk>,
    /// Bumped on every successful refresh; lets a waiter that queued for
    /// the refresh lock detect that someone else already refreshed.
    generation: u64,
}

/// Cache of the provider's signing keys, keyed by `kid`.
///
/// Keys are fetched lazily on the first verification and re-fetched when a
/// `kid` is unknown. Refresh is single-flight: concurrent verifications
/// that miss the cache serialize on one lock, and at most one of them
/// performs the network fetch.
pub(crate) struct JwksCache {
    client: reqwest::Client,
    jwks_uri: String,
    state: tokio::sync::RwLock<JwksState>,
    refresh: tokio::sync::Mutex<()>,
}

impl JwksCache {
    pub(crate) fn new(client: reqwest::Client, jwks_uri: String) -> Self {
        JwksCache {
            client,
            jwks_uri,
            state: tokio::sync::RwLock::new(JwksState {
                keys: Vec::new(),
                generation: 0,
            }),
            refresh: tokio::sync::Mutex::new(()),
        }
    }

    /// Find the verification key for `kid`, refreshing the set at most
    /// once if it is unknown. With no `kid`, only an unambiguous
    /// single-key set matches. `None` means the provider does not
    /// advertise such a key.
    pub(crate) async fn key_for(
        &self,
        kid: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Option<Jwk>> {
        let generation = {
            let state = self.state.read().await;
            if state.generation > 0 {
                if let Some(key) = Self::select(&state.keys, kid) {
                    return Ok(Some(key.clone()));
                }
            }
            state.generation
        };

        let _guard = self.refresh.lock().await;

        // Someone else may have refreshed while we waited on the lock.
        {
            let state = self.state.read().await;
            if state.generation > generation {
                return Ok(Self::select(&state.keys, kid).cloned());
            }
        }

        let keys = self.fetch(cancel).await?;
        debug!(count = keys.len(), uri = %self.jwks_uri, "refreshed JWKS");
        let mut state = self.state.write().await;
        state.keys = keys;
        state.generation += 1;
        Ok(Self::select(&state.keys, kid).cloned())
    }

    fn select<'a>(keys: &'a [Jwk], kid: Option<&str>) -> Option<&'a Jwk> {
        match kid {
            Some(kid) => keys.iter().find(|k| k.key_id() == Some(kid)),
            None if keys.len() == 1 => keys.first(),
            None => None,
        }
    }

    async fn fetch(&self, cancel: &CancellationToken) -> Result<Vec<Jwk>> {
        let resp = or_cancel(cancel, "jwks", self.client.get(&self.jwks_uri).send())
            .await?
            .map_err(|e| Error::InvalidJwks(format!("fetching {}: {e}", self.jwks_uri)))?;
        if !resp.status().is_success() {
            return Err(Error::InvalidJwks(format!(
                "fetching {}: status {}",
                self.jwks_uri,
                resp.status()
            )));
        }
        let body: Value = resp
            .json()
            .await
            .map_err(|e| Error::InvalidJwks(format!("decoding JWKS body: {e}")))?;
        let entries = body
            .get("keys")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::InvalidJwks("response has no keys array".to_string()))?;
        let mut keys = Vec::with_capacity(entries.len());
        for entry in entries {
            let map = entry
                .as_object()
                .ok_or_else(|| Error::InvalidJwks("JWK entry is not an object".to_string()))?;
            let jwk = Jwk::from_map(map.clone())
                .map_err(|e| Error::InvalidJwks(format!("malformed JWK: {e}")))?;
            keys.push(jwk);
        }
        Ok(keys)
    }
}
