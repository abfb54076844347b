//! Bearer token issuance and verification (HS256).

use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::claims::{validate_claims, ClaimsError, SessionClaims};

/// Process-wide signing secret.
///
/// There is no default: constructing one from empty input fails, and the
/// binary refuses to start without it.
#[derive(Clone)]
pub struct SigningSecret(Vec<u8>);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("signing secret is missing or empty")]
pub struct MissingSigningSecret;

impl SigningSecret {
    pub fn new(secret: impl Into<String>) -> Result<Self, MissingSigningSecret> {
        let secret = secret.into();
        if secret.trim().is_empty() {
            return Err(MissingSigningSecret);
        }
        Ok(Self(secret.into_bytes()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl core::fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("SigningSecret(<redacted>)")
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,

    #[error("token has expired")]
    Expired,

    #[error("token signature is invalid")]
    InvalidSignature,

    #[error("refusing to issue token: expires_at <= issued_at")]
    InvalidTimeWindow,

    #[error("token signing failed: {0}")]
    Signing(String),
}

/// Issues and verifies session tokens.
///
/// Holds no mutable state; clone freely behind an `Arc`.
pub struct TokenService {
    header: Header,
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl TokenService {
    pub fn new(secret: &SigningSecret) -> Self {
        Self {
            header: Header::new(Algorithm::HS256),
            encoding: EncodingKey::from_secret(&secret.0),
            decoding: DecodingKey::from_secret(&secret.0),
        }
    }

    /// Sign a claim set. Deterministic for a given secret and claim set.
    pub fn issue(&self, claims: &SessionClaims) -> Result<String, TokenError> {
        if claims.expires_at <= claims.issued_at {
            return Err(TokenError::InvalidTimeWindow);
        }
        jsonwebtoken::encode(&self.header, claims, &self.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Verify a token at `now`.
    ///
    /// Order: structure, then expiry, then signature. An expired token is
    /// reported as `Expired` whether or not its signature would have matched.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<SessionClaims, TokenError> {
        let unverified = decode_unverified(token)?;

        match validate_claims(&unverified, now) {
            Ok(()) => {}
            Err(ClaimsError::Expired) => return Err(TokenError::Expired),
            Err(ClaimsError::InvalidTimeWindow) => return Err(TokenError::Malformed),
        }

        let mut validation = Validation::new(Algorithm::HS256);
        relax_time_checks(&mut validation);

        jsonwebtoken::decode::<SessionClaims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature
                | ErrorKind::InvalidAlgorithm
                | ErrorKind::InvalidAlgorithmName => TokenError::InvalidSignature,
                _ => TokenError::Malformed,
            })
    }

    /// Stable session identifier for a raw bearer token.
    ///
    /// CSRF tokens are bound to this value, so they die with the login
    /// session that requested them.
    pub fn session_id(token: &str) -> String {
        hex::encode(Sha256::digest(token.as_bytes()))
    }
}

// Expiry is checked by `validate_claims` against an injected clock.
fn relax_time_checks(validation: &mut Validation) {
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.leeway = 0;
    validation.required_spec_claims.clear();
}

fn decode_unverified(token: &str) -> Result<SessionClaims, TokenError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    relax_time_checks(&mut validation);

    jsonwebtoken::decode::<SessionClaims>(token, &DecodingKey::from_secret(&[]), &validation)
        .map(|data| data.claims)
        .map_err(|_| TokenError::Malformed)
}
