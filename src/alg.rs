//! Registry of supported JWS signing algorithms.

use std::fmt;
use std::str::FromStr;

use josekit::JoseError;
use josekit::jwk::Jwk;
use josekit::jws::{self, JwsVerifier};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A JWS signing algorithm accepted for ID token verification.
///
/// The set is fixed at the nine RSA/ECDSA variants plus EdDSA; symmetric
/// (HS*) algorithms are deliberately absent since a relying party never
/// shares an HMAC secret with the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Alg {
    RS256,
    RS384,
    RS512,
    ES256,
    ES384,
    ES512,
    PS256,
    PS384,
    PS512,
    EdDSA,
}

/// The signature family an [`Alg`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlgFamily {
    /// RSASSA-PKCS1-v1_5
    Rsa,
    /// RSASSA-PSS
    RsaPss,
    /// ECDSA over a NIST curve
    Ecdsa,
    /// Edwards-curve signatures (Ed25519)
    Eddsa,
}

impl Alg {
    /// Every algorithm this library can verify.
    pub const ALL: [Alg; 10] = [
        Alg::RS256,
        Alg::RS384,
        Alg::RS512,
        Alg::ES256,
        Alg::ES384,
        Alg::ES512,
        Alg::PS256,
        Alg::PS384,
        Alg::PS512,
        Alg::EdDSA,
    ];

    /// The JOSE name of the algorithm, as it appears in a JWS header.
    pub fn as_str(&self) -> &'static str {
        match self {
            Alg::RS256 => "RS256",
            Alg::RS384 => "RS384",
            Alg::RS512 => "RS512",
            Alg::ES256 => "ES256",
            Alg::ES384 => "ES384",
            Alg::ES512 => "ES512",
            Alg::PS256 => "PS256",
            Alg::PS384 => "PS384",
            Alg::PS512 => "PS512",
            Alg::EdDSA => "EdDSA",
        }
    }

    /// The signature family the algorithm belongs to.
    pub fn family(&self) -> AlgFamily {
        match self {
            Alg::RS256 | Alg::RS384 | Alg::RS512 => AlgFamily::Rsa,
            Alg::PS256 | Alg::PS384 | Alg::PS512 => AlgFamily::RsaPss,
            Alg::ES256 | Alg::ES384 | Alg::ES512 => AlgFamily::Ecdsa,
            Alg::EdDSA => AlgFamily::Eddsa,
        }
    }

    /// The message digest paired with the algorithm.
    pub fn hash(&self) -> &'static str {
        match self {
            Alg::RS256 | Alg::PS256 | Alg::ES256 => "SHA-256",
            Alg::RS384 | Alg::PS384 | Alg::ES384 => "SHA-384",
            Alg::RS512 | Alg::PS512 | Alg::ES512 | Alg::EdDSA => "SHA-512",
        }
    }

    /// Build a verifier for this algorithm from a JWK.
    pub(crate) fn verifier_from_jwk(
        &self,
        jwk: &Jwk,
    ) -> std::result::Result<Box<dyn JwsVerifier>, JoseError> {
        Ok(match self {
            Alg::RS256 => Box::new(jws::RS256.verifier_from_jwk(jwk)?),
            Alg::RS384 => Box::new(jws::RS384.verifier_from_jwk(jwk)?),
            Alg::RS512 => Box::new(jws::RS512.verifier_from_jwk(jwk)?),
            Alg::ES256 => Box::new(jws::ES256.verifier_from_jwk(jwk)?),
            Alg::ES384 => Box::new(jws::ES384.verifier_from_jwk(jwk)?),
            Alg::ES512 => Box::new(jws::ES512.verifier_from_jwk(jwk)?),
            Alg::PS256 => Box::new(jws::PS256.verifier_from_jwk(jwk)?),
            Alg::PS384 => Box::new(jws::PS384.verifier_from_jwk(jwk)?),
            Alg::PS512 => Box::new(jws::PS512.verifier_from_jwk(jwk)?),
            Alg::EdDSA => Box::new(jws::EdDSA.verifier_from_jwk(jwk)?),
        })
    }
}

impl fmt::Display for Alg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Alg {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Alg::ALL
            .iter()
            .find(|a| a.as_str() == s)
            .copied()
            .ok_or_else(|| Error::UnsupportedAlg(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_round_trip() {
        for alg in Alg::ALL {
            assert_eq!(alg.as_str().parse::<Alg>().unwrap(), alg);
        }
    }

    #[test]
    fn rejects_unknown_names() {
        assert!(matches!("HS256".parse::<Alg>(), Err(Error::UnsupportedAlg(_))));
        assert!(matches!("none".parse::<Alg>(), Err(Error::UnsupportedAlg(_))));
    }

    #[test]
    fn family_mapping() {
        assert_eq!(Alg::RS512.family(), AlgFamily::Rsa);
        assert_eq!(Alg::PS256.family(), AlgFamily::RsaPss);
        assert_eq!(Alg::ES512.family(), AlgFamily::Ecdsa);
        assert_eq!(Alg::EdDSA.family(), AlgFamily::Eddsa);
    }

    #[test]
    fn serializes_as_jose_name() {
        assert_eq!(serde_json::to_string(&Alg::EdDSA).unwrap(), "\"EdDSA\"");
        assert_eq!(serde_json::to_string(&Alg::ES384).unwrap(), "\"ES384\"");
    }
}
