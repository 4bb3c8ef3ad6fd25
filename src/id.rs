//! Opaque random identifiers for request state and nonces.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{RngCore, rngs::OsRng};

use crate::error::{Error, Result};

/// 20 bytes of entropy, 160 bits, comfortably above the 128-bit floor for
/// CSRF/replay tokens.
const ID_BYTE_LEN: usize = 20;

/// Generate a URL-safe random identifier, optionally labeled with a literal
/// prefix (`new_id(Some("st"))` yields `st_<random>`).
///
/// Fails only if the OS entropy source does.
pub fn new_id(prefix: Option<&str>) -> Result<String> {
    let mut buf = [0u8; ID_BYTE_LEN];
    OsRng
        .try_fill_bytes(&mut buf)
        .map_err(|e| Error::RandomSource(e.to_string()))?;
    let encoded = URL_SAFE_NO_PAD.encode(buf);
    Ok(match prefix {
        Some(p) if !p.is_empty() => format!("{p}_{encoded}"),
        _ => encoded,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_unique_ids() {
        let a = new_id(None).unwrap();
        let b = new_id(None).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn applies_prefix() {
        let id = new_id(Some("st")).unwrap();
        assert!(id.starts_with("st_"));
        let nonce = new_id(Some("n")).unwrap();
        assert!(nonce.starts_with("n_"));
    }

    #[test]
    fn carries_at_least_128_bits() {
        let id = new_id(None).unwrap();
        let decoded = URL_SAFE_NO_PAD.decode(id.as_bytes()).unwrap();
        assert!(decoded.len() * 8 >= 128);
    }

    #[test]
    fn empty_prefix_is_ignored() {
        let id = new_id(Some("")).unwrap();
        assert!(!id.contains('_'));
    }
}
