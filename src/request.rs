//! Per-request authentication state for a single OIDC flow.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::NowFn;
use crate::error::{Error, Result};
use crate::id::new_id;
use crate::pkce::CodeVerifier;

/// Skew applied when checking a request's expiration, so a request that is
/// about to lapse is not used to start an exchange that cannot finish.
const REQUEST_EXPIRY_SKEW_SECS: i64 = 1;

/// How the end user is asked to authenticate and consent, per the OIDC
/// `display` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Display {
    Page,
    Popup,
    Touch,
    Wap,
}

impl Display {
    pub fn as_str(&self) -> &'static str {
        match self {
            Display::Page => "page",
            Display::Popup => "popup",
            Display::Touch => "touch",
            Display::Wap => "wap",
        }
    }
}

/// Values for the OIDC `prompt` parameter. `None` must not be combined
/// with any other prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prompt {
    None,
    Login,
    Consent,
    SelectAccount,
}

impl Prompt {
    pub fn as_str(&self) -> &'static str {
        match self {
            Prompt::None => "none",
            Prompt::Login => "login",
            Prompt::Consent => "consent",
            Prompt::SelectAccount => "select_account",
        }
    }
}

/// Which response the authorization endpoint is asked for. Exactly one
/// flow per request; PKCE and implicit are mutually exclusive by
/// construction.
#[derive(Clone)]
pub(crate) enum Flow {
    /// Plain authorization code flow.
    Code,
    /// Authorization code flow with PKCE.
    Pkce(CodeVerifier),
    /// Implicit flow with form_post, optionally requesting an access token
    /// alongside the id_token.
    Implicit { include_access_token: bool },
}

/// One OIDC authentication attempt.
///
/// Carries the data needed to correlate the authorization redirect with
/// its callback: the `id` travels as the OAuth2 `state` parameter, the
/// `nonce` is bound into the issued ID token. The two are always distinct.
///
/// A request is created by the caller, consumed by
/// [`Provider::auth_url`](crate::Provider::auth_url), looked up by `id`
/// when the callback arrives, handed to
/// [`Provider::exchange`](crate::Provider::exchange), and discarded after
/// success or expiry. It has no mutable state after construction.
#[derive(Clone)]
pub struct Request {
    id: String,
    nonce: String,
    redirect_url: String,
    expiration: DateTime<Utc>,
    audiences: Vec<String>,
    scopes: Vec<String>,
    display: Option<Display>,
    prompts: Vec<Prompt>,
    ui_locales: Vec<String>,
    acr_values: Vec<String>,
    request_claims: Option<String>,
    max_age: Option<u64>,
    flow: Flow,
    now_fn: NowFn,
}

impl Request {
    /// Create a request for the plain authorization code flow. Use
    /// [`Request::builder`] for per-request overrides, PKCE, or the
    /// implicit flow.
    pub fn new(expire_in: Duration, redirect_url: impl Into<String>) -> Result<Self> {
        Request::builder(expire_in, redirect_url).build()
    }

    pub fn builder(expire_in: Duration, redirect_url: impl Into<String>) -> RequestBuilder {
        RequestBuilder {
            expire_in,
            redirect_url: redirect_url.into(),
            audiences: Vec::new(),
            scopes: Vec::new(),
            display: None,
            prompts: Vec::new(),
            ui_locales: Vec::new(),
            acr_values: Vec::new(),
            request_claims: None,
            max_age: None,
            pkce: None,
            implicit: None,
            now_fn: None,
        }
    }

    /// Unique opaque value carried as the OAuth2 `state` parameter. Never
    /// equal to [`Request::nonce`].
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Unique value bound into the ID token's `nonce` claim to defeat
    /// replay.
    pub fn nonce(&self) -> &str {
        &self.nonce
    }

    /// Where the provider must redirect the authorization response.
    pub fn redirect_url(&self) -> &str {
        &self.redirect_url
    }

    pub fn expiration(&self) -> DateTime<Utc> {
        self.expiration
    }

    /// Per-request audience allow-list override. Empty means the
    /// configured defaults apply.
    pub fn audiences(&self) -> &[String] {
        &self.audiences
    }

    /// Per-request scopes requested in addition to `openid`. Empty means
    /// the configured defaults apply.
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    pub fn display(&self) -> Option<Display> {
        self.display
    }

    pub fn prompts(&self) -> &[Prompt] {
        &self.prompts
    }

    pub fn ui_locales(&self) -> &[String] {
        &self.ui_locales
    }

    pub fn acr_values(&self) -> &[String] {
        &self.acr_values
    }

    /// Raw JSON for the `claims` request parameter, passed through
    /// verbatim.
    pub fn request_claims(&self) -> Option<&str> {
        self.request_claims.as_deref()
    }

    /// Maximum allowed authentication age in seconds. A positive value
    /// makes `auth_time` a required claim during verification.
    pub fn max_age(&self) -> Option<u64> {
        self.max_age
    }

    /// The PKCE verifier, when this request uses the PKCE flow.
    pub fn pkce_verifier(&self) -> Option<&CodeVerifier> {
        match &self.flow {
            Flow::Pkce(v) => Some(v),
            _ => None,
        }
    }

    /// `Some(include_access_token)` when this request uses the implicit
    /// flow with form_post.
    pub fn implicit_flow(&self) -> Option<bool> {
        match &self.flow {
            Flow::Implicit {
                include_access_token,
            } => Some(*include_access_token),
            _ => None,
        }
    }

    pub(crate) fn flow(&self) -> &Flow {
        &self.flow
    }

    /// True once the request is within one second of its deadline.
    pub fn is_expired(&self) -> bool {
        (self.now_fn)() + Duration::seconds(REQUEST_EXPIRY_SKEW_SECS) >= self.expiration
    }

    /// Re-assert construction invariants. Construction makes these
    /// unrepresentable; provider operations still call this as a cheap
    /// second line before putting request data on the wire.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(Error::InvalidParameter("request id is empty".to_string()));
        }
        if self.nonce.is_empty() {
            return Err(Error::InvalidParameter(
                "request nonce is empty".to_string(),
            ));
        }
        if self.id == self.nonce {
            return Err(Error::InvalidParameter(
                "request id and nonce are equal".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("id", &self.id)
            .field("nonce", &self.nonce)
            .field("redirect_url", &self.redirect_url)
            .field("expiration", &self.expiration)
            .field("audiences", &self.audiences)
            .field("scopes", &self.scopes)
            .field("max_age", &self.max_age)
            .field("pkce", &self.pkce_verifier().is_some())
            .field("implicit", &self.implicit_flow())
            .finish()
    }
}

/// Builder for [`Request`], covering the optional per-request overrides.
pub struct RequestBuilder {
    expire_in: Duration,
    redirect_url: String,
    audiences: Vec<String>,
    scopes: Vec<String>,
    display: Option<Display>,
    prompts: Vec<Prompt>,
    ui_locales: Vec<String>,
    acr_values: Vec<String>,
    request_claims: Option<String>,
    max_age: Option<u64>,
    pkce: Option<CodeVerifier>,
    implicit: Option<bool>,
    now_fn: Option<NowFn>,
}

impl RequestBuilder {
    /// Audience allow-list override for this request's ID token
    /// verification.
    pub fn audiences(mut self, audiences: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.audiences = audiences.into_iter().map(Into::into).collect();
        self
    }

    /// Extra scopes to request; `openid` is always included first.
    pub fn scopes(mut self, scopes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    pub fn display(mut self, display: Display) -> Self {
        self.display = Some(display);
        self
    }

    pub fn prompts(mut self, prompts: impl IntoIterator<Item = Prompt>) -> Self {
        self.prompts = prompts.into_iter().collect();
        self
    }

    /// BCP-47 language tags for the `ui_locales` parameter, in preference
    /// order.
    pub fn ui_locales(mut self, locales: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.ui_locales = locales.into_iter().map(Into::into).collect();
        self
    }

    pub fn acr_values(mut self, values: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.acr_values = values.into_iter().map(Into::into).collect();
        self
    }

    /// Raw JSON for the `claims` request parameter. Sent percent-encoded,
    /// byte for byte.
    pub fn request_claims(mut self, claims_json: impl Into<String>) -> Self {
        self.request_claims = Some(claims_json.into());
        self
    }

    /// Sets `max_age` on the wire and, when positive, requires a fresh
    /// enough `auth_time` claim during verification.
    pub fn max_age(mut self, seconds: u64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    /// Use the authorization code flow with PKCE. Incompatible with
    /// [`RequestBuilder::implicit_flow`].
    pub fn pkce(mut self, verifier: CodeVerifier) -> Self {
        self.pkce = Some(verifier);
        self
    }

    /// Use the implicit flow with form_post. `include_access_token`
    /// requests `id_token token` instead of just `id_token`. Incompatible
    /// with [`RequestBuilder::pkce`].
    pub fn implicit_flow(mut self, include_access_token: bool) -> Self {
        self.implicit = Some(include_access_token);
        self
    }

    /// Override the clock, for tests.
    pub fn now_fn(mut self, now_fn: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.now_fn = Some(Arc::new(now_fn));
        self
    }

    pub fn build(self) -> Result<Request> {
        if self.redirect_url.is_empty() {
            return Err(Error::InvalidParameter(
                "request: redirect URL is empty".to_string(),
            ));
        }
        if self.expire_in <= Duration::zero() {
            return Err(Error::InvalidParameter(
                "request: expire_in is not greater than zero".to_string(),
            ));
        }
        if self.pkce.is_some() && self.implicit.is_some() {
            return Err(Error::InvalidParameter(
                "request: both implicit flow and authorization code with PKCE requested"
                    .to_string(),
            ));
        }
        if self.prompts.contains(&Prompt::None) && self.prompts.len() > 1 {
            return Err(Error::InvalidParameter(
                "request: prompt none cannot be combined with other prompts".to_string(),
            ));
        }

        let nonce = new_id(Some("n"))?;
        let id = new_id(Some("st"))?;
        if id == nonce {
            return Err(Error::InvalidParameter(
                "request: generated id and nonce are equal".to_string(),
            ));
        }

        let flow = match (self.pkce, self.implicit) {
            (Some(verifier), None) => Flow::Pkce(verifier),
            (None, Some(include_access_token)) => Flow::Implicit {
                include_access_token,
            },
            _ => Flow::Code,
        };
        let now_fn: NowFn = self.now_fn.unwrap_or_else(|| Arc::new(Utc::now));
        let expiration = now_fn() + self.expire_in;

        Ok(Request {
            id,
            nonce,
            redirect_url: self.redirect_url,
            expiration,
            audiences: self.audiences,
            scopes: self.scopes,
            display: self.display,
            prompts: self.prompts,
            ui_locales: self.ui_locales,
            acr_values: self.acr_values,
            request_claims: self.request_claims,
            max_age: self.max_age,
            flow,
            now_fn,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REDIRECT: &str = "https://test-redirect";

    #[test]
    fn id_and_nonce_are_distinct_and_prefixed() {
        let r = Request::new(Duration::minutes(1), REDIRECT).unwrap();
        assert!(r.id().starts_with("st_"));
        assert!(r.nonce().starts_with("n_"));
        assert_ne!(r.id(), r.nonce());
        assert!(!r.id().is_empty() && !r.nonce().is_empty());
    }

    #[test]
    fn expiration_is_after_creation() {
        let r = Request::new(Duration::minutes(1), REDIRECT).unwrap();
        assert!(r.expiration() > Utc::now());
        assert!(!r.is_expired());
    }

    #[test]
    fn rejects_empty_redirect() {
        let got = Request::new(Duration::minutes(1), "");
        assert!(matches!(got, Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn rejects_non_positive_expire_in() {
        for d in [Duration::zero(), Duration::seconds(-1)] {
            let got = Request::new(d, REDIRECT);
            assert!(matches!(got, Err(Error::InvalidParameter(_))));
        }
    }

    #[test]
    fn rejects_pkce_combined_with_implicit() {
        let verifier = CodeVerifier::new().unwrap();
        let got = Request::builder(Duration::minutes(1), REDIRECT)
            .pkce(verifier)
            .implicit_flow(false)
            .build();
        assert!(matches!(got, Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn rejects_prompt_none_with_others() {
        let got = Request::builder(Duration::minutes(1), REDIRECT)
            .prompts([Prompt::None, Prompt::Login])
            .build();
        assert!(matches!(got, Err(Error::InvalidParameter(_))));

        let ok = Request::builder(Duration::minutes(1), REDIRECT)
            .prompts([Prompt::None])
            .build();
        assert!(ok.is_ok());
    }

    #[test]
    fn expiry_check_applies_one_second_skew() {
        // Half a second of life is inside the skew window.
        let r = Request::new(Duration::milliseconds(500), REDIRECT).unwrap();
        assert!(r.is_expired());

        let r = Request::new(Duration::seconds(10), REDIRECT).unwrap();
        assert!(!r.is_expired());
    }

    #[test]
    fn one_nanosecond_requests_are_born_expired() {
        let r = Request::new(Duration::nanoseconds(1), REDIRECT).unwrap();
        assert!(r.is_expired());
    }

    #[test]
    fn injected_clock_drives_expiry() {
        let start = Utc::now();
        let r = Request::builder(Duration::seconds(30), REDIRECT)
            .now_fn(move || start)
            .build()
            .unwrap();
        // Frozen clock: 30s of life against a 1s skew.
        assert!(!r.is_expired());
        assert_eq!(r.expiration(), start + Duration::seconds(30));
    }

    #[test]
    fn flow_accessors_reflect_choice() {
        let code = Request::new(Duration::minutes(1), REDIRECT).unwrap();
        assert!(code.pkce_verifier().is_none());
        assert!(code.implicit_flow().is_none());

        let verifier = CodeVerifier::new().unwrap();
        let challenge = verifier.challenge().to_string();
        let pkce = Request::builder(Duration::minutes(1), REDIRECT)
            .pkce(verifier)
            .build()
            .unwrap();
        assert_eq!(pkce.pkce_verifier().unwrap().challenge(), challenge);
        assert!(pkce.implicit_flow().is_none());

        let implicit = Request::builder(Duration::minutes(1), REDIRECT)
            .implicit_flow(true)
            .build()
            .unwrap();
        assert_eq!(implicit.implicit_flow(), Some(true));
        assert!(implicit.pkce_verifier().is_none());
    }

    #[test]
    fn options_are_carried() {
        let r = Request::builder(Duration::minutes(1), REDIRECT)
            .audiences(["override-aud"])
            .scopes(["email", "profile"])
            .display(Display::Wap)
            .prompts([Prompt::Login, Prompt::Consent])
            .ui_locales(["en-US", "es"])
            .acr_values(["phr", "phrh"])
            .request_claims(r#"{"id_token":{"auth_time":{"essential":true}}}"#)
            .max_age(3600)
            .build()
            .unwrap();
        assert_eq!(r.audiences(), ["override-aud"]);
        assert_eq!(r.scopes(), ["email", "profile"]);
        assert_eq!(r.display(), Some(Display::Wap));
        assert_eq!(r.prompts(), [Prompt::Login, Prompt::Consent]);
        assert_eq!(r.ui_locales(), ["en-US", "es"]);
        assert_eq!(r.acr_values(), ["phr", "phrh"]);
        assert!(r.request_claims().unwrap().contains("auth_time"));
        assert_eq!(r.max_age(), Some(3600));
    }
}
