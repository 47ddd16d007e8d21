//! ID token claim decoding
//!
//! Security note: by default the ID token signature is NOT verified. The
//! token comes straight from the first-party identity service over TLS and is
//! only inspected to read its `exp` claim for the renewal policy. Deployments
//! holding the signing key can enable the `verify-signature` feature and
//! attach a [`TokenVerifier`].

use crate::error::{FreetradeError, FtResult};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct ExpiryClaims {
    exp: i64,
}

/// A bearer ID token together with its decoded expiry
#[derive(Clone, PartialEq, Eq)]
pub struct IdToken {
    raw: String,
    expires_at: i64,
}

impl std::fmt::Debug for IdToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdToken")
            .field("raw", &redact(&self.raw))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl IdToken {
    /// Decode the claims segment without checking the signature
    ///
    /// # Errors
    /// Returns `MalformedToken` if the token is not a JWT with an `exp` claim
    pub fn parse_unverified(raw: &str) -> FtResult<Self> {
        let mut segments = raw.split('.');
        let (Some(_header), Some(payload), Some(_signature), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return Err(FreetradeError::malformed("expected three dot-separated segments"));
        };

        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|e| FreetradeError::malformed(format!("claims are not base64url: {e}")))?;
        let claims: ExpiryClaims = serde_json::from_slice(&bytes)
            .map_err(|e| FreetradeError::malformed(format!("claims lack a numeric exp: {e}")))?;

        Ok(Self {
            raw: raw.to_string(),
            expires_at: claims.exp,
        })
    }

    /// The encoded token
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// `exp` claim as a Unix timestamp
    #[must_use]
    pub fn expires_at(&self) -> i64 {
        self.expires_at
    }

    /// Seconds until expiry, negative once expired
    #[must_use]
    pub fn seconds_remaining(&self, now: i64) -> i64 {
        self.expires_at - now
    }

    /// True when fewer than `margin_secs` remain at `now`
    #[must_use]
    pub fn needs_refresh(&self, now: i64, margin_secs: i64) -> bool {
        self.seconds_remaining(now) < margin_secs
    }
}

/// Short prefix of a secret for log lines
pub(crate) fn redact(token: &str) -> String {
    let prefix: String = token.chars().take(8).collect();
    format!("{prefix}...")
}

#[cfg(feature = "verify-signature")]
pub use verified::TokenVerifier;

#[cfg(feature = "verify-signature")]
mod verified {
    use super::{ExpiryClaims, IdToken};
    use crate::error::{FreetradeError, FtResult};
    use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};

    /// Signature check applied to every ID token before it is stored
    #[derive(Clone)]
    pub struct TokenVerifier {
        key: DecodingKey,
        validation: Validation,
    }

    impl std::fmt::Debug for TokenVerifier {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("TokenVerifier")
                .field("algorithms", &self.validation.algorithms)
                .finish()
        }
    }

    impl TokenVerifier {
        /// RS256 verifier from a PEM encoded public key
        ///
        /// # Errors
        /// Returns an error if the PEM cannot be parsed
        pub fn from_rsa_pem(pem: &[u8]) -> FtResult<Self> {
            let key = DecodingKey::from_rsa_pem(pem)
                .map_err(|e| FreetradeError::malformed(format!("invalid RSA key: {e}")))?;
            Ok(Self::with_key(key, Algorithm::RS256))
        }

        /// HS256 verifier from a shared secret
        #[must_use]
        pub fn from_secret(secret: &[u8]) -> Self {
            Self::with_key(DecodingKey::from_secret(secret), Algorithm::HS256)
        }

        fn with_key(key: DecodingKey, algorithm: Algorithm) -> Self {
            let mut validation = Validation::new(algorithm);
            // Expiry is handled by the renewal policy
            validation.validate_exp = false;
            validation.validate_aud = false;
            validation.set_required_spec_claims(&["exp"]);
            Self { key, validation }
        }

        /// Verify the signature and read the `exp` claim
        ///
        /// # Errors
        /// Returns `MalformedToken` if the signature or claims are invalid
        pub fn verify(&self, raw: &str) -> FtResult<IdToken> {
            let data = decode::<ExpiryClaims>(raw, &self.key, &self.validation)
                .map_err(|e| FreetradeError::malformed(format!("signature check failed: {e}")))?;
            Ok(IdToken {
                raw: raw.to_string(),
                expires_at: data.claims.exp,
            })
        }
    }
}
