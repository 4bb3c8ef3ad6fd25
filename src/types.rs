//! Wire payloads and claim value helpers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Token endpoint success payload (RFC 6749 §5.1 plus OIDC `id_token`).
///
/// Fields are optional on the wire so the caller can classify what exactly
/// the provider omitted.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
}

/// Token endpoint error payload (RFC 6749 §5.2).
#[derive(Debug, Clone, Deserialize)]
pub struct TokenErrorResponse {
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

/// A claim that may be a single string or a list of strings, like `aud`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClaimValue {
    Single(String),
    Multiple(Vec<String>),
}

impl ClaimValue {
    /// Parse from a raw claim value; `None` if it is neither a string nor
    /// an array of strings.
    pub fn from_json(value: &Value) -> Option<ClaimValue> {
        serde_json::from_value(value.clone()).ok()
    }

    pub fn contains(&self, value: &str) -> bool {
        match self {
            ClaimValue::Single(s) => s == value,
            ClaimValue::Multiple(v) => v.iter().any(|s| s == value),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ClaimValue::Single(_) => 1,
            ClaimValue::Multiple(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_slice(&self) -> &[String] {
        match self {
            ClaimValue::Single(s) => std::slice::from_ref(s),
            ClaimValue::Multiple(v) => v.as_slice(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_string_and_list_forms() {
        let single = ClaimValue::from_json(&json!("alice")).unwrap();
        assert_eq!(single, ClaimValue::Single("alice".to_string()));
        assert_eq!(single.len(), 1);
        assert!(single.contains("alice"));

        let multi = ClaimValue::from_json(&json!(["alice", "bob"])).unwrap();
        assert_eq!(multi.len(), 2);
        assert!(multi.contains("bob"));
        assert!(!multi.contains("eve"));

        assert!(ClaimValue::from_json(&json!(42)).is_none());
    }

    #[test]
    fn token_response_tolerates_missing_fields() {
        let tr: TokenResponse = serde_json::from_value(json!({
            "access_token": "at",
        }))
        .unwrap();
        assert_eq!(tr.access_token.as_deref(), Some("at"));
        assert!(tr.id_token.is_none());
        assert!(tr.expires_in.is_none());
    }
}
