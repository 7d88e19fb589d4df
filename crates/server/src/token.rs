//! Access credential issuing and verification.
//!
//! Short-lived bearer credentials are HS256-signed JWTs. The signing key,
//! issuer string and TTL are fixed configuration inputs; key rotation is a
//! configuration-only operation. Refresh secrets are handled elsewhere
//! (see `session`), never inside the credential itself.

use crate::error::AuthError;
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Claims carried by every access credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject (the principal's username)
    pub sub: String,
    /// Issuer identity
    pub iss: String,
    /// Issued-at, unix seconds
    pub iat: usize,
    /// Expiry, unix seconds
    pub exp: usize,
    /// Role names granted to the principal
    pub roles: Vec<String>,
}

/// Issues and verifies signed access credentials with a single symmetric key.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    access_ttl_secs: i64,
}

impl TokenIssuer {
    pub fn new(secret: &str, issuer: &str, access_exp_mins: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            issuer: issuer.to_string(),
            access_ttl_secs: access_exp_mins * 60,
        }
    }

    /// Access credential lifetime in seconds, as advertised to clients.
    pub fn access_ttl_secs(&self) -> i64 {
        self.access_ttl_secs
    }

    /// Mint a signed credential for `subject` carrying the given role claims.
    pub fn issue(&self, subject: &str, roles: Vec<String>) -> Result<String, AuthError> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let claims = AccessClaims {
            sub: subject.to_string(),
            iss: self.issuer.clone(),
            iat: now as usize,
            exp: (now + self.access_ttl_secs) as usize,
            roles,
        };
        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Internal(format!("credential signing failed: {e}")))
    }

    /// Parse and validate a credential, returning its claims.
    ///
    /// Expiry maps to `TokenExpired`; a bad signature, wrong issuer or
    /// malformed token all map to `TokenInvalid`. Callers surface both as
    /// plain "unauthenticated" — the distinction only reaches the log.
    pub fn verify(&self, token: &str) -> Result<AccessClaims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        match decode::<AccessClaims>(token, &self.decoding_key, &validation) {
            Ok(data) => Ok(data.claims),
            Err(e) if matches!(e.kind(), ErrorKind::ExpiredSignature) => {
                tracing::debug!(
                    name = "token.verify.expired",
                    target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                    message = "Rejected expired access credential"
                );
                Err(AuthError::TokenExpired)
            }
            Err(e) => {
                tracing::debug!(
                    name = "token.verify.invalid",
                    target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                    error = %e,
                    message = "Rejected invalid access credential"
                );
                Err(AuthError::TokenInvalid)
            }
        }
    }
}
