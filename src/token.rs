//! Tokens returned from a successful exchange, and bearer token sources.

use std::fmt;

use chrono::{DateTime, Duration, Utc};

use crate::NowFn;
use crate::error::{Error, Result};

/// Skew subtracted from the expiry when deciding whether an access token is
/// still usable, absorbing transit latency to the resource server.
const TOKEN_EXPIRY_SKEW_SECS: i64 = 10;

/// The result of a successful authorization-code (or PKCE) exchange: the
/// verified ID token plus the provider's access and refresh tokens.
///
/// All fields are immutable after the exchange. Expiry checks consult the
/// clock the owning provider was built with.
#[derive(Clone)]
pub struct Token {
    id_token: String,
    access_token: String,
    refresh_token: Option<String>,
    expiry: Option<DateTime<Utc>>,
    now_fn: NowFn,
}

impl Token {
    pub(crate) fn new(
        id_token: String,
        access_token: String,
        refresh_token: Option<String>,
        expiry: Option<DateTime<Utc>>,
        now_fn: NowFn,
    ) -> Self {
        Token {
            id_token,
            access_token,
            refresh_token,
            expiry,
            now_fn,
        }
    }

    /// The verified ID token in JWS compact serialization.
    pub fn id_token(&self) -> &str {
        &self.id_token
    }

    /// The bearer access token for the UserInfo endpoint and resource
    /// servers.
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    /// When the access token expires, if the provider said.
    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        self.expiry
    }

    /// True when the token carries a non-empty access token.
    pub fn valid(&self) -> bool {
        !self.access_token.is_empty()
    }

    /// True once `now >= expiry - skew`. Tokens without a known expiry
    /// never report expired.
    pub fn is_expired(&self) -> bool {
        match self.expiry {
            Some(expiry) => (self.now_fn)() >= expiry - Duration::seconds(TOKEN_EXPIRY_SKEW_SECS),
            None => false,
        }
    }

    /// A non-refreshing [`TokenSource`] yielding this token's access token.
    pub fn static_token_source(&self) -> StaticTokenSource {
        StaticTokenSource {
            access_token: self.access_token.clone(),
        }
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("id_token", &"[REDACTED: id_token]")
            .field("access_token", &"[REDACTED: access_token]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED: refresh_token]"))
            .field("expiry", &self.expiry)
            .finish()
    }
}

/// Source of bearer access tokens for authenticated provider requests.
pub trait TokenSource: Send + Sync {
    /// The access token to present. Implementations may refresh; the
    /// built-in [`StaticTokenSource`] never does.
    fn access_token(&self) -> Result<String>;
}

/// A [`TokenSource`] that always yields the same access token.
#[derive(Debug, Clone)]
pub struct StaticTokenSource {
    access_token: String,
}

impl StaticTokenSource {
    pub fn new(access_token: impl Into<String>) -> Self {
        StaticTokenSource {
            access_token: access_token.into(),
        }
    }
}

impl TokenSource for StaticTokenSource {
    fn access_token(&self) -> Result<String> {
        if self.access_token.is_empty() {
            return Err(Error::NilParameter("access token"));
        }
        Ok(self.access_token.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn token_with_expiry(expiry: Option<DateTime<Utc>>) -> Token {
        Token::new(
            "id-token".to_string(),
            "access-token".to_string(),
            Some("refresh-token".to_string()),
            expiry,
            Arc::new(Utc::now),
        )
    }

    #[test]
    fn valid_means_non_empty_access_token() {
        assert!(token_with_expiry(None).valid());
        let empty = Token::new(
            "id-token".to_string(),
            String::new(),
            None,
            None,
            Arc::new(Utc::now),
        );
        assert!(!empty.valid());
    }

    #[test]
    fn expiry_honors_skew_and_injected_clock() {
        let now = Utc::now();
        let now_fn: NowFn = Arc::new(move || now);

        let fresh = Token::new(
            "id".into(),
            "at".into(),
            None,
            Some(now + Duration::hours(1)),
            now_fn.clone(),
        );
        assert!(!fresh.is_expired());

        // Inside the skew window counts as expired.
        let closing = Token::new(
            "id".into(),
            "at".into(),
            None,
            Some(now + Duration::seconds(5)),
            now_fn.clone(),
        );
        assert!(closing.is_expired());

        let stale = Token::new(
            "id".into(),
            "at".into(),
            None,
            Some(now - Duration::seconds(1)),
            now_fn,
        );
        assert!(stale.is_expired());
    }

    #[test]
    fn no_expiry_never_expires() {
        assert!(!token_with_expiry(None).is_expired());
    }

    #[test]
    fn static_source_yields_the_access_token() {
        let token = token_with_expiry(None);
        let source = token.static_token_source();
        assert_eq!(source.access_token().unwrap(), "access-token");
    }

    #[test]
    fn static_source_rejects_empty_token() {
        let source = StaticTokenSource::new("");
        assert!(matches!(
            source.access_token(),
            Err(Error::NilParameter("access token"))
        ));
    }

    #[test]
    fn debug_redacts_token_material() {
        let token = token_with_expiry(None);
        let rendered = format!("{token:?}");
        assert!(!rendered.contains("id-token"));
        assert!(!rendered.contains("access-token"));
        assert!(!rendered.contains("refresh-token"));
    }
}
