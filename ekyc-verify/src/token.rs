//! Capability tokens for verification links
//!
//! Tokens are self-contained HS256 JWTs binding a user to one session,
//! scoped to the single purpose "verification" and carrying an absolute
//! deadline. There is no refresh: a new link means a new session id and a
//! new token. Validation is purely cryptographic and never consults the
//! session store; callers double-check the session's own `expires_at`
//! because a session can be invalidated independently of token expiry.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The only purpose this service accepts
const PURPOSE_VERIFICATION: &str = "verification";

/// Decoded token claims
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub user_id: i64,
    pub session_id: String,
    /// Issued-at, seconds since epoch
    pub iat: i64,
    /// Expiry, seconds since epoch
    pub exp: i64,
    /// Declared purpose; anything other than "verification" is rejected
    /// even under a valid signature
    pub purpose: String,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TokenError {
    /// Malformed or bad-signature token
    #[error("Invalid token")]
    Invalid,

    /// Signature fine, deadline passed
    #[error("Token has expired")]
    Expired,

    /// Valid signature but not a verification token; security-relevant
    #[error("Token purpose is not 'verification'")]
    WrongPurpose,
}

/// Issues and validates verification tokens
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl_minutes: i64,
}

impl TokenService {
    pub fn new(secret: &str, ttl_minutes: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl_minutes,
        }
    }

    pub fn ttl_minutes(&self) -> i64 {
        self.ttl_minutes
    }

    /// Issue a token for one user/session pair
    ///
    /// Only infrastructure faults (encoding failure) error here; there is
    /// no user-input failure mode at issuance.
    pub fn issue(&self, user_id: i64, session_id: &str) -> anyhow::Result<String> {
        let now = Utc::now();
        let claims = TokenClaims {
            user_id,
            session_id: session_id.to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::minutes(self.ttl_minutes)).timestamp(),
            purpose: PURPOSE_VERIFICATION.to_string(),
        };

        Ok(encode(&Header::default(), &claims, &self.encoding_key)?)
    }

    /// Verify signature, expiry and purpose atomically
    pub fn validate(&self, token: &str) -> Result<TokenClaims, TokenError> {
        let mut validation = Validation::default();
        validation.leeway = 0;

        let data = decode::<TokenClaims>(token, &self.decoding_key, &validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            }
        })?;

        if data.claims.purpose != PURPOSE_VERIFICATION {
            return Err(TokenError::WrongPurpose);
        }

        Ok(data.claims)
    }
}
