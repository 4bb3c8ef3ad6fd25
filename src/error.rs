//! Error types for the OIDC relying-party library.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by request construction, provider configuration, the
/// authorization flows, and ID token / UserInfo verification.
///
/// Each protocol check failure maps to exactly one variant, so callers can
/// classify a failure with `matches!` instead of string inspection. Messages
/// carry the operation that raised them plus the underlying cause.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A required input was absent or unset.
    #[error("missing required parameter: {0}")]
    NilParameter(&'static str),

    /// An input failed a structural or semantic check.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The configured provider CA PEM could not be parsed.
    #[error("could not parse CA PEM: {0}")]
    InvalidCaCert(String),

    /// The `iss` claim did not match the configured issuer.
    #[error("invalid issuer: expected {expected}, got {got}")]
    InvalidIssuer { expected: String, got: String },

    /// No element of the `aud` claim was in the audience allow-list.
    #[error("invalid audience: {0}")]
    InvalidAudience(String),

    /// The `azp` claim was required but missing, or did not match the
    /// client id.
    #[error("invalid authorized party: {0}")]
    InvalidAuthorizedParty(String),

    /// The `nonce` claim did not match the request nonce.
    #[error("invalid nonce: id token nonce does not match the request nonce")]
    InvalidNonce,

    /// The `iat` claim is in the future beyond the allowed skew.
    #[error("invalid issued at: id token issued in the future")]
    InvalidIssuedAt,

    /// The `nbf` claim is still in the future.
    #[error("invalid not before: id token is not valid yet")]
    InvalidNotBefore,

    /// The token is expired (`exp` in the past, or an already-expired
    /// access token was returned by the provider).
    #[error("token is expired")]
    ExpiredToken,

    /// The `auth_time` claim is older than the request's `max_age`.
    #[error("expired auth_time: authentication is too old")]
    ExpiredAuthTime,

    /// A required claim was absent.
    #[error("missing claim: {0}")]
    MissingClaim(&'static str),

    /// The token endpoint response did not include an `id_token`.
    #[error("token endpoint response is missing an id_token")]
    MissingIdToken,

    /// The token endpoint response did not include an `access_token`.
    #[error("token endpoint response is missing an access_token")]
    MissingAccessToken,

    /// The token header `alg` is not in the configured set.
    #[error("unsupported signing algorithm: {0}")]
    UnsupportedAlg(String),

    /// Signature verification failed.
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    /// The JWKS endpoint was unreachable or its body was not a well-formed
    /// JWK set.
    #[error("invalid JWKS: {0}")]
    InvalidJwks(String),

    /// The UserInfo `sub` claim did not match the expected subject.
    #[error("invalid subject: expected {expected}, got {got}")]
    InvalidSubject { expected: String, got: String },

    /// A redirect URL was not in the configured allow-list.
    #[error("unauthorized redirect URL: {0}")]
    UnauthorizedRedirectUri(String),

    /// The remote endpoint returned 404.
    #[error("not found: {0}")]
    NotFound(String),

    /// The token endpoint rejected the exchange. `status` is the HTTP
    /// status line, `error` the OAuth2 error code from the response body.
    #[error("token exchange failed: {status}: {error}")]
    TokenExchange { status: String, error: String },

    /// The provider was shut down via `Provider::done` before or during
    /// the operation.
    #[error("operation canceled: {0}: provider is done")]
    Canceled(&'static str),

    /// The OS entropy source failed.
    #[error("random source failure: {0}")]
    RandomSource(String),

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
}
