//! PKCE code verifier and S256 challenge (RFC 7636).

use std::fmt;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{RngCore, rngs::OsRng};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// 64 random bytes encode to an 86-character verifier, inside the RFC's
/// 43..=128 character window.
const VERIFIER_BYTE_LEN: usize = 64;

/// The only challenge method this library emits. `plain` is rejected by
/// construction: there is no way to build a verifier that uses it.
pub const CODE_CHALLENGE_METHOD: &str = "S256";

/// A PKCE code verifier with its derived S256 challenge.
///
/// Created once per authentication request and immutable afterwards. The
/// challenge travels in the authorization URL; the verifier is only released
/// to the token endpoint during the code exchange.
#[derive(Clone, PartialEq, Eq)]
pub struct CodeVerifier {
    verifier: String,
    challenge: String,
}

impl CodeVerifier {
    /// Generate a new high-entropy verifier and compute its challenge.
    pub fn new() -> Result<Self> {
        let mut buf = [0u8; VERIFIER_BYTE_LEN];
        OsRng
            .try_fill_bytes(&mut buf)
            .map_err(|e| Error::RandomSource(e.to_string()))?;
        let verifier = URL_SAFE_NO_PAD.encode(buf);
        let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
        Ok(CodeVerifier {
            verifier,
            challenge,
        })
    }

    /// The raw verifier, sent only to the token endpoint.
    pub fn verifier(&self) -> &str {
        &self.verifier
    }

    /// BASE64URL(SHA256(verifier)), without padding.
    pub fn challenge(&self) -> &str {
        &self.challenge
    }

    /// Always `"S256"`.
    pub fn method(&self) -> &'static str {
        CODE_CHALLENGE_METHOD
    }
}

// The verifier is a flow-binding secret; keep it out of debug output.
impl fmt::Debug for CodeVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodeVerifier")
            .field("verifier", &"[REDACTED: code verifier]")
            .field("challenge", &self.challenge)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn challenge_is_sha256_of_verifier() {
        let v = CodeVerifier::new().unwrap();
        let expected = URL_SAFE_NO_PAD.encode(Sha256::digest(v.verifier().as_bytes()));
        assert_eq!(v.challenge(), expected);
        assert_eq!(v.method(), "S256");
    }

    #[test]
    fn verifier_length_and_alphabet() {
        let v = CodeVerifier::new().unwrap();
        let len = v.verifier().len();
        assert!((43..=128).contains(&len), "length {len} outside RFC window");
        assert!(
            v.verifier()
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn verifiers_are_unique() {
        let a = CodeVerifier::new().unwrap();
        let b = CodeVerifier::new().unwrap();
        assert_ne!(a.verifier(), b.verifier());
        assert_ne!(a.challenge(), b.challenge());
    }

    #[test]
    fn debug_redacts_verifier() {
        let v = CodeVerifier::new().unwrap();
        let rendered = format!("{v:?}");
        assert!(!rendered.contains(v.verifier()));
        assert!(rendered.contains("[REDACTED: code verifier]"));
    }
}
