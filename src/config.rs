//! Provider and relying-party configuration.

use std::fmt;

use serde::{Deserialize, Serialize, Serializer};
use url::Url;

use crate::alg::Alg;
use crate::error::{Error, Result};

/// The literal every textual or structured rendering of a client secret
/// produces.
pub const REDACTED_CLIENT_SECRET: &str = "[REDACTED: client secret]";

/// Default timeout for requests to the provider.
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// An OAuth2 client secret that redacts itself everywhere except through
/// [`ClientSecret::secret`].
///
/// `Display`, `Debug`, and `Serialize` all yield [`REDACTED_CLIENT_SECRET`];
/// the raw value is only read when forming the token-endpoint request.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct ClientSecret(String);

impl ClientSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        ClientSecret(secret.into())
    }

    /// The raw secret. Use only to authenticate against the token endpoint.
    pub fn secret(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for ClientSecret {
    fn from(s: &str) -> Self {
        ClientSecret(s.to_string())
    }
}

impl From<String> for ClientSecret {
    fn from(s: String) -> Self {
        ClientSecret(s)
    }
}

impl fmt::Display for ClientSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED_CLIENT_SECRET)
    }
}

impl fmt::Debug for ClientSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{REDACTED_CLIENT_SECRET:?}")
    }
}

impl Serialize for ClientSecret {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(REDACTED_CLIENT_SECRET)
    }
}

/// Immutable configuration for a three-legged OIDC authorization flow
/// against a single provider.
///
/// Validated at construction and revalidated when a
/// [`Provider`](crate::Provider) accepts it.
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Case-sensitive issuer URL: `https` (or `http` for test providers),
    /// no query, no fragment. Discovery happens at
    /// `{issuer}/.well-known/openid-configuration`.
    pub issuer: String,

    /// The relying party's client id.
    pub client_id: String,

    /// The relying party's client secret.
    pub client_secret: ClientSecret,

    /// Non-empty set of signing algorithms accepted for ID tokens.
    pub supported_signing_algs: Vec<Alg>,

    /// Every redirect URL a request may use, compared by exact string
    /// equality. The first entry is the conventional default.
    pub allowed_redirect_urls: Vec<String>,

    /// Default audience allow-list for `aud` verification. When empty, the
    /// client id is the only accepted audience.
    pub audiences: Vec<String>,

    /// Default extra scopes requested alongside the mandatory `openid`.
    pub scopes: Vec<String>,

    /// Optional PEM certificate appended to the trust roots for requests
    /// to the provider.
    pub provider_ca: Option<String>,

    /// Timeout applied to every request to the provider.
    pub http_timeout_secs: u64,
}

impl Config {
    /// Compose and validate a configuration.
    pub fn new(
        issuer: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<ClientSecret>,
        supported_signing_algs: Vec<Alg>,
        allowed_redirect_urls: Vec<String>,
    ) -> Result<Self> {
        let config = Config {
            issuer: issuer.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            supported_signing_algs,
            allowed_redirect_urls,
            audiences: Vec::new(),
            scopes: Vec::new(),
            provider_ca: None,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_audiences(mut self, audiences: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.audiences = audiences.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_scopes(mut self, scopes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_provider_ca(mut self, ca_pem: impl Into<String>) -> Self {
        self.provider_ca = Some(ca_pem.into());
        self
    }

    pub fn with_http_timeout(mut self, seconds: u64) -> Self {
        self.http_timeout_secs = seconds;
        self
    }

    /// Validate the configuration. Verifies the issuer shape but does not
    /// check that it is actually discoverable.
    pub fn validate(&self) -> Result<()> {
        if self.client_id.is_empty() {
            return Err(Error::InvalidParameter(
                "config: client id is empty".to_string(),
            ));
        }
        if self.client_secret.is_empty() {
            return Err(Error::InvalidParameter(
                "config: client secret is empty".to_string(),
            ));
        }
        if self.issuer.is_empty() {
            return Err(Error::InvalidParameter(
                "config: issuer is empty".to_string(),
            ));
        }
        let issuer = Url::parse(&self.issuer).map_err(|e| {
            Error::InvalidParameter(format!("config: issuer {} is invalid: {e}", self.issuer))
        })?;
        if issuer.scheme() != "https" && issuer.scheme() != "http" {
            return Err(Error::InvalidParameter(format!(
                "config: issuer {} scheme is not http or https",
                self.issuer
            )));
        }
        if issuer.query().is_some() || issuer.fragment().is_some() {
            return Err(Error::InvalidParameter(format!(
                "config: issuer {} must not have a query or fragment",
                self.issuer
            )));
        }
        if self.supported_signing_algs.is_empty() {
            return Err(Error::InvalidParameter(
                "config: supported signing algorithms is empty".to_string(),
            ));
        }
        if self.allowed_redirect_urls.is_empty() {
            return Err(Error::InvalidParameter(
                "config: allowed redirect URLs is empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> Config {
        Config::new(
            "https://idp.test",
            "test-client-id",
            "test-client-secret",
            vec![Alg::ES256],
            vec!["https://test-redirect".to_string()],
        )
        .unwrap()
    }

    #[test]
    fn accepts_valid_config() {
        let c = valid();
        assert!(c.validate().is_ok());
        assert_eq!(c.http_timeout_secs, 30);
    }

    #[test]
    fn rejects_empty_fields() {
        for (issuer, id, secret) in [
            ("https://idp.test", "", "secret"),
            ("https://idp.test", "id", ""),
            ("", "id", "secret"),
        ] {
            let got = Config::new(
                issuer,
                id,
                secret,
                vec![Alg::ES256],
                vec!["https://test-redirect".to_string()],
            );
            assert!(matches!(got, Err(Error::InvalidParameter(_))));
        }
    }

    #[test]
    fn rejects_empty_algs_and_redirects() {
        assert!(matches!(
            Config::new(
                "https://idp.test",
                "id",
                "secret",
                vec![],
                vec!["https://test-redirect".to_string()],
            ),
            Err(Error::InvalidParameter(_))
        ));
        assert!(matches!(
            Config::new("https://idp.test", "id", "secret", vec![Alg::ES256], vec![]),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn rejects_bad_issuer_urls() {
        for issuer in [
            "ftp://idp.test",
            "https://idp.test?query=1",
            "https://idp.test#frag",
            "%%%%%",
        ] {
            let got = Config::new(
                issuer,
                "id",
                "secret",
                vec![Alg::ES256],
                vec!["https://test-redirect".to_string()],
            );
            assert!(matches!(got, Err(Error::InvalidParameter(_))), "{issuer}");
        }
    }

    #[test]
    fn http_issuer_allowed_for_test_providers() {
        let got = Config::new(
            "http://127.0.0.1:8080",
            "id",
            "secret",
            vec![Alg::ES256],
            vec!["https://test-redirect".to_string()],
        );
        assert!(got.is_ok());
    }

    #[test]
    fn secret_redacts_in_every_rendering() {
        let c = valid();
        let secret = "test-client-secret";

        assert_eq!(c.client_secret.to_string(), REDACTED_CLIENT_SECRET);
        assert!(!format!("{:?}", c.client_secret).contains(secret));

        let debug = format!("{c:?}");
        assert!(!debug.contains(secret));
        assert!(debug.contains(REDACTED_CLIENT_SECRET));

        let json = serde_json::to_string(&c).unwrap();
        assert!(!json.contains(secret));
        assert!(json.contains("[REDACTED: client secret]"));

        assert_eq!(c.client_secret.secret(), secret);
    }

    #[test]
    fn builder_options_apply() {
        let c = valid()
            .with_audiences(["aud-1", "aud-2"])
            .with_scopes(["email"])
            .with_provider_ca("-----BEGIN CERTIFICATE-----")
            .with_http_timeout(5);
        assert_eq!(c.audiences, vec!["aud-1", "aud-2"]);
        assert_eq!(c.scopes, vec!["email"]);
        assert!(c.provider_ca.is_some());
        assert_eq!(c.http_timeout_secs, 5);
    }
}
