//! OpenID Connect 1.0 relying-party library.
//!
//! This crate lets an application authenticate end users against a
//! compliant OpenID Provider: it generates per-request state (CSRF and
//! replay defenses), builds authorization URLs for the code, PKCE, and
//! implicit (form_post) flows, exchanges authorization codes for tokens,
//! cryptographically verifies issued ID tokens, and retrieves UserInfo
//! claims.
//!
//! The typical flow:
//!
//! 1. Build a [`Config`] and a [`Provider`] (runs OIDC discovery).
//! 2. Per login, create a [`Request`] and send the user to
//!    [`Provider::auth_url`].
//! 3. When the callback arrives, look the request up by its id (the
//!    `state` parameter) and call [`Provider::exchange`] with the returned
//!    state and code.
//! 4. Optionally fetch extra claims with [`Provider::user_info`].
//!
//! Signature verification covers RS256/384/512, PS256/384/512,
//! ES256/384/512, and EdDSA. All verification is pure; network I/O is
//! confined to discovery, the token endpoint, JWKS retrieval, and
//! UserInfo. A [`Provider`] is safe to share across tasks, and
//! [`Provider::done`] aborts its in-flight provider requests.

use std::sync::Arc;

use chrono::{DateTime, Utc};

mod alg;
mod config;
mod discovery;
mod error;
mod http;
mod id;
mod pkce;
mod provider;
mod request;
mod token;
mod types;

#[cfg(test)]
mod tests;

pub use alg::{Alg, AlgFamily};
pub use config::{ClientSecret, Config, REDACTED_CLIENT_SECRET};
pub use discovery::DiscoveryDocument;
pub use error::{Error, Result};
pub use id::new_id;
pub use pkce::{CODE_CHALLENGE_METHOD, CodeVerifier};
pub use provider::{Claims, Provider};
pub use request::{Display, Prompt, Request, RequestBuilder};
pub use token::{StaticTokenSource, Token, TokenSource};
pub use types::{ClaimValue, TokenErrorResponse, TokenResponse};

/// Injected clock used by every time comparison, overridable for tests.
pub(crate) type NowFn = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;
