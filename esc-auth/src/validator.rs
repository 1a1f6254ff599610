//! Access-token validation
//!
//! Access tokens are RS256-signed JWTs. They are checked against the RSA key
//! of the identity provider's signing certificate, then their time claims are
//! checked with a clock-skew allowance. A token that fails any check is
//! treated as invalid and the cache goes back to the identity provider.
//!
//! The audience claim is compared with the accepted audiences and the result
//! is reported on [`ValidatedToken`], but a mismatch does not make the token
//! invalid.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use x509_parser::public_key::PublicKey;

use crate::token::TokenRecord;

/// Signing certificate of the identity provider
const EMBEDDED_CERTIFICATE: &str = include_str!("../certs/identity.pem");

/// Audiences issued for the Event Store Cloud API
pub const ACCEPTED_AUDIENCES: &[&str] = &[
    "https://api.eventstore.cloud",
    "qB1dK9gAx6U1H1miH4LfwCp4Q1y3qSeZ",
];

/// Allowed clock skew when checking time claims, in seconds
pub const CLOCK_SKEW_SECS: u64 = 30;

/// Reasons an access token is rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenValidationError {
    #[error("invalid signing certificate: {0}")]
    Certificate(String),

    #[error("invalid token signature")]
    Signature,

    /// Correctly signed but past `exp`
    #[error("token has expired")]
    Expired { claims: Box<AccessTokenClaims> },

    /// Correctly signed but `nbf` or `iat` lies in the future
    #[error("token is not valid yet")]
    NotYetValid { claims: Box<AccessTokenClaims> },

    #[error("malformed token: {0}")]
    Malformed(String),
}

impl TokenValidationError {
    /// Claims of a correctly signed token that was rejected for its time claims
    pub fn claims(&self) -> Option<&AccessTokenClaims> {
        match self {
            Self::Expired { claims } | Self::NotYetValid { claims } => Some(claims),
            _ => None,
        }
    }
}

/// `aud` may be a single string or a list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    Single(String),
    Multiple(Vec<String>),
}

impl Audience {
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        let values: &[String] = match self {
            Audience::Single(aud) => std::slice::from_ref(aud),
            Audience::Multiple(auds) => auds,
        };
        values.iter().map(String::as_str)
    }
}

/// Claims carried by an access token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<Audience>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Every other claim, kept for inspection
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A token that passed signature and time checks
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedToken {
    pub claims: AccessTokenClaims,
    /// Whether any `aud` value is in the accepted list. Informational only.
    pub audience_accepted: bool,
}

/// Verifies access tokens against the identity provider's certificate
#[derive(Clone)]
pub struct TokenValidator {
    key: Result<DecodingKey, TokenValidationError>,
    accepted_audiences: Vec<String>,
    leeway: u64,
}

impl std::fmt::Debug for TokenValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenValidator")
            .field("key_loaded", &self.key.is_ok())
            .field("accepted_audiences", &self.accepted_audiences)
            .field("leeway", &self.leeway)
            .finish()
    }
}

impl Default for TokenValidator {
    fn default() -> Self {
        Self::embedded()
    }
}

impl TokenValidator {
    /// Validator using the certificate bundled with this crate
    pub fn embedded() -> Self {
        Self::from_certificate_pem(EMBEDDED_CERTIFICATE)
    }

    /// Build a validator from a PEM-encoded X.509 certificate.
    ///
    /// A certificate that cannot be parsed does not fail here: the validator
    /// is still returned and rejects every token.
    pub fn from_certificate_pem(pem: impl AsRef<[u8]>) -> Self {
        let key = decoding_key_from_certificate(pem.as_ref());
        if let Err(e) = &key {
            tracing::warn!(error = %e, "Token signing certificate could not be loaded");
        }

        Self {
            key,
            accepted_audiences: ACCEPTED_AUDIENCES.iter().map(|s| s.to_string()).collect(),
            leeway: CLOCK_SKEW_SECS,
        }
    }

    /// Like [`from_certificate_pem`](Self::from_certificate_pem) but fails on a bad certificate
    pub fn try_from_certificate_pem(pem: impl AsRef<[u8]>) -> Result<Self, TokenValidationError> {
        let validator = Self::from_certificate_pem(pem);
        match &validator.key {
            Ok(_) => Ok(validator),
            Err(e) => Err(e.clone()),
        }
    }

    pub fn with_accepted_audiences(mut self, audiences: Vec<String>) -> Self {
        self.accepted_audiences = audiences;
        self
    }

    pub fn with_leeway(mut self, leeway_secs: u64) -> Self {
        self.leeway = leeway_secs;
        self
    }

    /// Error from loading the certificate, if it failed
    pub fn certificate_error(&self) -> Option<&TokenValidationError> {
        self.key.as_ref().err()
    }

    /// Verify the signature and time claims of an access token
    pub fn validate(&self, access_token: &str) -> Result<ValidatedToken, TokenValidationError> {
        let key = self.key.as_ref().map_err(|e| e.clone())?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.leeway = self.leeway;
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let data = decode::<AccessTokenClaims>(access_token, key, &validation)
            .map_err(|e| rejection(access_token, key, e))?;
        let claims = data.claims;

        // iat is not checked by jsonwebtoken
        if let Some(iat) = claims.iat
            && iat > jsonwebtoken::get_current_timestamp() + self.leeway
        {
            return Err(TokenValidationError::NotYetValid {
                claims: Box::new(claims),
            });
        }

        let audience_accepted = claims.aud.as_ref().is_some_and(|aud| {
            aud.iter()
                .any(|value| self.accepted_audiences.iter().any(|a| a == value))
        });
        if !audience_accepted {
            debug!(
                audience = ?claims.aud,
                "Access token audience is not in the accepted list"
            );
        }

        Ok(ValidatedToken {
            claims,
            audience_accepted,
        })
    }

    /// Whether the record's access token can be used as-is
    pub fn is_valid(&self, record: &TokenRecord) -> bool {
        match self.validate(&record.access_token) {
            Ok(_) => true,
            Err(e) => {
                debug!(error = %e, "Access token is not valid");
                false
            }
        }
    }
}

/// Map a decoding failure to a validation error.
///
/// Time-claim failures are only reported after the signature has been
/// verified, so their claims are decoded again without the time checks.
fn rejection(
    access_token: &str,
    key: &DecodingKey,
    error: jsonwebtoken::errors::Error,
) -> TokenValidationError {
    match error.kind() {
        ErrorKind::ExpiredSignature => match signed_claims(access_token, key) {
            Ok(claims) => TokenValidationError::Expired {
                claims: Box::new(claims),
            },
            Err(e) => e,
        },
        ErrorKind::ImmatureSignature => match signed_claims(access_token, key) {
            Ok(claims) => TokenValidationError::NotYetValid {
                claims: Box::new(claims),
            },
            Err(e) => e,
        },
        ErrorKind::InvalidSignature
        | ErrorKind::InvalidAlgorithm
        | ErrorKind::InvalidRsaKey(_)
        | ErrorKind::InvalidKeyFormat => TokenValidationError::Signature,
        _ => TokenValidationError::Malformed(error.to_string()),
    }
}

/// Claims of a token whose signature verifies, ignoring time claims
fn signed_claims(
    access_token: &str,
    key: &DecodingKey,
) -> Result<AccessTokenClaims, TokenValidationError> {
    let mut validation = Validation::new(Algorithm::RS256);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    decode::<AccessTokenClaims>(access_token, key, &validation)
        .map(|data| data.claims)
        .map_err(|e| TokenValidationError::Malformed(e.to_string()))
}

/// Extract the RSA public key of a PEM certificate
fn decoding_key_from_certificate(pem: &[u8]) -> Result<DecodingKey, TokenValidationError> {
    let (_, pem) = x509_parser::pem::parse_x509_pem(pem)
        .map_err(|e| TokenValidationError::Certificate(e.to_string()))?;
    let cert = pem
        .parse_x509()
        .map_err(|e| TokenValidationError::Certificate(e.to_string()))?;

    let spki = cert.public_key();
    match spki.parsed() {
        Ok(PublicKey::RSA(_)) => {}
        Ok(_) => {
            return Err(TokenValidationError::Certificate(
                "certificate does not carry an RSA public key".to_string(),
            ));
        }
        Err(e) => return Err(TokenValidationError::Certificate(e.to_string())),
    }

    Ok(DecodingKey::from_rsa_der(&spki.subject_public_key.data))
}
