//! The relying-party provider: authorization URLs, code exchange, ID token
//! verification, and UserInfo retrieval.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use josekit::{jws, jwt};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use url::Url;

use crate::NowFn;
use crate::alg::Alg;
use crate::config::Config;
use crate::discovery::{DiscoveryDocument, JwksCache};
use crate::error::{Error, Result};
use crate::http::{new_client, or_cancel};
use crate::request::{Flow, Request};
use crate::token::{Token, TokenSource};
use crate::types::{ClaimValue, TokenErrorResponse, TokenResponse};

/// Allowance for clock drift between this process and the provider when
/// checking `exp`, `nbf`, `iat`, and `auth_time`.
const CLAIM_SKEW_SECS: i64 = 2;

/// The verified claims of an ID token or UserInfo response.
pub type Claims = Map<String, Value>;

/// A configured relying party bound to one OpenID Provider.
///
/// Construction performs discovery; the resulting metadata, HTTP client,
/// and configuration are immutable afterwards, so a `Provider` (usually
/// behind an `Arc`) is safe to share across request handlers. The JWKS
/// cache is the only mutable state and is internally synchronized.
pub struct Provider {
    config: Config,
    client: reqwest::Client,
    discovery: DiscoveryDocument,
    jwks: JwksCache,
    cancel: CancellationToken,
    now_fn: NowFn,
}

impl Provider {
    /// Create a provider: validate the configuration, build the HTTP
    /// client (honoring `provider_ca`), and run discovery against
    /// `{issuer}/.well-known/openid-configuration`.
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let client = new_client(&config)?;
        let cancel = CancellationToken::new();

        let discovery = DiscoveryDocument::fetch(&client, &config.issuer, &cancel).await?;
        if discovery.issuer != config.issuer {
            return Err(Error::InvalidIssuer {
                expected: config.issuer.clone(),
                got: discovery.issuer.clone(),
            });
        }
        debug!(issuer = %config.issuer, "provider discovery complete");

        let jwks = JwksCache::new(client.clone(), discovery.jwks_uri.clone());
        Ok(Provider {
            config,
            client,
            discovery,
            jwks,
            cancel,
            now_fn: Arc::new(Utc::now),
        })
    }

    /// Override the clock used for token expiry and claim checks, for
    /// tests.
    pub fn with_now_fn(
        mut self,
        now_fn: impl Fn() -> DateTime<Utc> + Send + Sync + 'static,
    ) -> Self {
        self.now_fn = Arc::new(now_fn);
        self
    }

    /// The configuration this provider was built with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The cached discovery metadata.
    pub fn discovery(&self) -> &DiscoveryDocument {
        &self.discovery
    }

    /// Release the provider: cancels any in-flight discovery or JWKS
    /// refresh and makes every subsequent call fail with
    /// [`Error::Canceled`]. Idempotent.
    pub fn done(&self) {
        self.cancel.cancel();
    }

    fn ensure_open(&self, op: &'static str) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Canceled(op));
        }
        Ok(())
    }

    fn now(&self) -> DateTime<Utc> {
        (self.now_fn)()
    }

    /// Build the authorization URL for `request`.
    ///
    /// Query keys are emitted in lexicographic order so the output is
    /// deterministic; values use form-urlencoding (space as `+`). `scope`
    /// always begins with `openid`.
    pub fn auth_url(&self, request: &Request) -> Result<Url> {
        self.ensure_open("auth_url")?;
        request.validate()?;
        Url::parse(request.redirect_url()).map_err(|e| {
            Error::InvalidParameter(format!(
                "auth_url: redirect URL {} cannot be parsed: {e}",
                request.redirect_url()
            ))
        })?;
        if let Err(e) = self.valid_redirect(request.redirect_url()) {
            return Err(Error::InvalidParameter(format!("auth_url: {e}")));
        }

        let mut scopes = vec!["openid".to_string()];
        let requested = if !request.scopes().is_empty() {
            request.scopes()
        } else {
            &self.config.scopes
        };
        for scope in requested {
            if !scopes.iter().any(|s| s == scope) {
                scopes.push(scope.clone());
            }
        }

        let mut params: BTreeMap<&'static str, String> = BTreeMap::new();
        params.insert("client_id", self.config.client_id.clone());
        params.insert("nonce", request.nonce().to_string());
        params.insert("redirect_uri", request.redirect_url().to_string());
        params.insert("scope", scopes.join(" "));
        params.insert("state", request.id().to_string());

        match request.flow() {
            Flow::Code => {
                params.insert("response_type", "code".to_string());
            }
            Flow::Pkce(verifier) => {
                params.insert("response_type", "code".to_string());
                params.insert("code_challenge", verifier.challenge().to_string());
                params.insert("code_challenge_method", verifier.method().to_string());
            }
            Flow::Implicit {
                include_access_token,
            } => {
                let response_type = if *include_access_token {
                    "id_token token"
                } else {
                    "id_token"
                };
                params.insert("response_type", response_type.to_string());
                params.insert("response_mode", "form_post".to_string());
            }
        }

        if let Some(display) = request.display() {
            params.insert("display", display.as_str().to_string());
        }
        if !request.prompts().is_empty() {
            let joined = request
                .prompts()
                .iter()
                .map(|p| p.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            params.insert("prompt", joined);
        }
        if !request.ui_locales().is_empty() {
            params.insert("ui_locales", request.ui_locales().join(" "));
        }
        if !request.acr_values().is_empty() {
            params.insert("acr_values", request.acr_values().join(" "));
        }
        if let Some(claims) = request.request_claims() {
            params.insert("claims", claims.to_string());
        }
        if let Some(max_age) = request.max_age() {
            params.insert("max_age", max_age.to_string());
        }

        let mut url = Url::parse(&self.discovery.authorization_endpoint)?;
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &params {
                pairs.append_pair(key, value);
            }
        }
        debug!(state = %request.id(), "built authorization URL");
        Ok(url)
    }

    /// Complete the authorization-code (or PKCE) flow: exchange `code` at
    /// the token endpoint and verify the returned ID token against
    /// `request`.
    ///
    /// `returned_state` is the `state` parameter from the callback and
    /// must equal the request id.
    pub async fn exchange(
        &self,
        request: &Request,
        returned_state: &str,
        code: &str,
    ) -> Result<Token> {
        self.ensure_open("exchange")?;
        if returned_state != request.id() {
            return Err(Error::InvalidParameter(
                "exchange: returned state does not match the request id".to_string(),
            ));
        }
        if request.is_expired() {
            return Err(Error::InvalidParameter(
                "exchange: authentication request is expired".to_string(),
            ));
        }

        let mut form: Vec<(&str, &str)> = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", request.redirect_url()),
            ("client_id", &self.config.client_id),
        ];
        if let Some(verifier) = request.pkce_verifier() {
            form.push(("code_verifier", verifier.verifier()));
        }

        let use_basic = self.discovery.token_auth_uses_basic();
        if !use_basic {
            form.push(("client_secret", self.config.client_secret.secret()));
        }
        let mut http_request = self
            .client
            .post(&self.discovery.token_endpoint)
            .form(&form);
        if use_basic {
            http_request = http_request.basic_auth(
                &self.config.client_id,
                Some(self.config.client_secret.secret()),
            );
        }

        let resp = or_cancel(&self.cancel, "exchange", http_request.send()).await??;
        let status = resp.status();
        if !status.is_success() {
            let status_line = format!(
                "{} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("")
            );
            let body = resp.text().await.unwrap_or_default();
            let code = serde_json::from_str::<TokenErrorResponse>(&body)
                .map(|e| e.error)
                .unwrap_or_default();
            error!(%status_line, error_code = %code, "token exchange rejected");
            return Err(Error::TokenExchange {
                status: status_line,
                error: code,
            });
        }

        let token_response: TokenResponse = resp.json().await?;
        let id_token = match token_response.id_token {
            Some(t) if !t.is_empty() => t,
            _ => return Err(Error::MissingIdToken),
        };
        let access_token = match token_response.access_token {
            Some(t) if !t.is_empty() => t,
            _ => return Err(Error::MissingAccessToken),
        };

        let claims = self.verify_id_token(&id_token, request).await?;

        let now = self.now();
        let expiry = match token_response.expires_in {
            Some(seconds) => Some(now + Duration::seconds(seconds)),
            None => claim_seconds(&claims, "exp").and_then(|s| DateTime::from_timestamp(s, 0)),
        };
        if let Some(expiry) = expiry {
            if expiry <= now {
                return Err(Error::ExpiredToken);
            }
        }

        info!(state = %request.id(), "code exchange complete");
        Ok(Token::new(
            id_token,
            access_token,
            token_response.refresh_token,
            expiry,
            self.now_fn.clone(),
        ))
    }

    /// Verify an ID token against `request` and return its claims.
    ///
    /// Checks run in protocol order: header algorithm, signature (via the
    /// cached JWKS), issuer, temporal claims, audience and authorized
    /// party, nonce, and `auth_time` freshness when the request set
    /// `max_age`.
    pub async fn verify_id_token(&self, id_token: &str, request: &Request) -> Result<Claims> {
        self.ensure_open("verify_id_token")?;
        if id_token.is_empty() {
            return Err(Error::InvalidParameter(
                "verify_id_token: id token is empty".to_string(),
            ));
        }
        if request.nonce().is_empty() {
            return Err(Error::InvalidParameter(
                "verify_id_token: request nonce is empty".to_string(),
            ));
        }

        let header = jwt::decode_header(id_token).map_err(|e| {
            Error::InvalidParameter(format!("verify_id_token: malformed id token: {e}"))
        })?;
        let alg_name = header
            .claim("alg")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                Error::InvalidParameter("verify_id_token: id token header has no alg".to_string())
            })?;
        let alg: Alg = alg_name.parse()?;
        if !self.config.supported_signing_algs.contains(&alg) {
            return Err(Error::UnsupportedAlg(alg_name.to_string()));
        }
        let kid = header.claim("kid").and_then(Value::as_str);

        let jwk = self
            .jwks
            .key_for(kid, &self.cancel)
            .await?
            .ok_or_else(|| {
                Error::InvalidSignature(format!(
                    "no verification key for kid {}",
                    kid.unwrap_or("<none>")
                ))
            })?;

        let verifier = alg
            .verifier_from_jwk(&jwk)
            .map_err(|e| Error::InvalidSignature(e.to_string()))?;
        let (payload, _header) = jws::deserialize_compact(id_token, &*verifier)
            .map_err(|e| Error::InvalidSignature(e.to_string()))?;

        let claims: Claims = serde_json::from_slice(&payload).map_err(|e| {
            Error::InvalidParameter(format!("verify_id_token: claims are not JSON: {e}"))
        })?;

        self.verify_claims(&claims, request)?;
        Ok(claims)
    }

    /// The pure (non-network) claim checks, in protocol order.
    fn verify_claims(&self, claims: &Claims, request: &Request) -> Result<()> {
        let now = self.now().timestamp();

        let issuer = claims.get("iss").and_then(Value::as_str).unwrap_or("");
        if issuer != self.config.issuer {
            return Err(Error::InvalidIssuer {
                expected: self.config.issuer.clone(),
                got: issuer.to_string(),
            });
        }

        let exp = claim_seconds(claims, "exp").ok_or(Error::MissingClaim("exp"))?;
        if exp <= now - CLAIM_SKEW_SECS {
            return Err(Error::ExpiredToken);
        }
        if let Some(nbf) = claim_seconds(claims, "nbf") {
            if nbf > now + CLAIM_SKEW_SECS {
                return Err(Error::InvalidNotBefore);
            }
        }
        let iat = claim_seconds(claims, "iat").ok_or(Error::MissingClaim("iat"))?;
        if iat > now + CLAIM_SKEW_SECS {
            return Err(Error::InvalidIssuedAt);
        }

        let audiences = claims
            .get("aud")
            .and_then(ClaimValue::from_json)
            .filter(|aud| !aud.is_empty())
            .ok_or_else(|| Error::InvalidAudience("id token has no aud claim".to_string()))?;
        // A multi-valued aud must overlap the allow-list. A single foreign
        // audience is instead legitimized by the azp rule below, matching
        // OpenID Connect Core 3.1.3.7.
        if audiences.len() > 1 {
            let allowed: &[String] = if !request.audiences().is_empty() {
                request.audiences()
            } else if !self.config.audiences.is_empty() {
                &self.config.audiences
            } else {
                std::slice::from_ref(&self.config.client_id)
            };
            if !audiences.as_slice().iter().any(|aud| allowed.contains(aud)) {
                return Err(Error::InvalidAudience(format!(
                    "aud {:?} has no overlap with the allowed audiences",
                    audiences.as_slice()
                )));
            }
        }

        let azp = claims.get("azp").and_then(Value::as_str);
        let azp_required = audiences.len() > 1
            || audiences
                .as_slice()
                .first()
                .is_some_and(|aud| *aud != self.config.client_id);
        match azp {
            Some(azp) if azp != self.config.client_id => {
                return Err(Error::InvalidAuthorizedParty(format!(
                    "azp {azp} does not match the client id"
                )));
            }
            None if azp_required => {
                return Err(Error::InvalidAuthorizedParty(
                    "azp claim is required but missing".to_string(),
                ));
            }
            _ => {}
        }

        let nonce = claims.get("nonce").and_then(Value::as_str).unwrap_or("");
        if nonce != request.nonce() {
            return Err(Error::InvalidNonce);
        }

        if let Some(max_age) = request.max_age() {
            if max_age > 0 {
                let auth_time =
                    claim_seconds(claims, "auth_time").ok_or(Error::MissingClaim("auth_time"))?;
                if now - auth_time > max_age as i64 + CLAIM_SKEW_SECS {
                    return Err(Error::ExpiredAuthTime);
                }
            }
        }

        Ok(())
    }

    /// Fetch UserInfo claims with a bearer token, verify them, and decode
    /// into `C`.
    ///
    /// The response's `iss` and `aud` are checked when present; `sub` must
    /// equal `expected_subject`. `audiences` extends the accepted audience
    /// set beyond the client id.
    pub async fn user_info<C: DeserializeOwned>(
        &self,
        token_source: &dyn TokenSource,
        expected_subject: &str,
        audiences: &[String],
    ) -> Result<C> {
        self.ensure_open("user_info")?;
        let access_token = token_source.access_token()?;
        if access_token.is_empty() {
            return Err(Error::NilParameter("access token"));
        }
        let endpoint = self
            .discovery
            .userinfo_endpoint
            .as_deref()
            .ok_or_else(|| {
                Error::NotFound("user_info: provider does not advertise a userinfo endpoint".to_string())
            })?;

        let resp = or_cancel(
            &self.cancel,
            "user_info",
            self.client.get(endpoint).bearer_auth(&access_token).send(),
        )
        .await??;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::NotFound(format!(
                "user_info: {endpoint} returned 404"
            )));
        }
        let resp = resp.error_for_status()?;
        let body: Value = resp.json().await?;

        if let Some(issuer) = body.get("iss").and_then(Value::as_str) {
            if issuer != self.config.issuer {
                return Err(Error::InvalidIssuer {
                    expected: self.config.issuer.clone(),
                    got: issuer.to_string(),
                });
            }
        }
        if let Some(aud) = body.get("aud").and_then(ClaimValue::from_json) {
            let overlaps = aud
                .as_slice()
                .iter()
                .any(|a| *a == self.config.client_id || audiences.contains(a));
            if !overlaps {
                return Err(Error::InvalidAudience(format!(
                    "userinfo aud {:?} has no overlap with the allowed audiences",
                    aud.as_slice()
                )));
            }
        }
        let subject = body.get("sub").and_then(Value::as_str).unwrap_or("");
        if subject != expected_subject {
            return Err(Error::InvalidSubject {
                expected: expected_subject.to_string(),
                got: subject.to_string(),
            });
        }

        serde_json::from_value(body).map_err(Error::from)
    }

    /// Check a redirect URL against the configured allow-list by exact,
    /// case-sensitive string equality. No host or port normalization:
    /// `localhost` and `127.0.0.1` are different, and so are two ports.
    /// An empty allow-list accepts any syntactically valid URL.
    pub fn valid_redirect(&self, candidate: &str) -> Result<()> {
        redirect_allowed(&self.config.allowed_redirect_urls, candidate)
    }
}

impl Drop for Provider {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn redirect_allowed(allowed: &[String], candidate: &str) -> Result<()> {
    Url::parse(candidate).map_err(|e| {
        Error::InvalidParameter(format!(
            "valid_redirect: redirect URL {candidate} cannot be parsed: {e}"
        ))
    })?;
    if allowed.is_empty() {
        return Ok(());
    }
    if allowed.iter().any(|entry| entry == candidate) {
        return Ok(());
    }
    Err(Error::UnauthorizedRedirectUri(candidate.to_string()))
}

/// Read a numeric time claim as epoch seconds, tolerating providers that
/// encode them as floats.
fn claim_seconds(claims: &Claims, key: &str) -> Option<i64> {
    let value = claims.get(key)?;
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f as i64))
}
