//! Signed session tokens (HS256 JWT).
//!
//! Expiry is checked against the injected [`Clock`] rather than by
//! `jsonwebtoken` itself, so tests can move time forward deterministically.

use chrono::Duration;
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::clock::Clock;
use crate::config::AuthConfig;
use crate::db::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenKind::Access => write!(f, "ACCESS"),
            TokenKind::Refresh => write!(f, "REFRESH"),
        }
    }
}

/// Claim set carried by every token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Username
    pub sub: String,
    pub uid: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
    pub kind: TokenKind,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token signature is invalid")]
    Invalid,
    #[error("token has expired")]
    Expired,
    #[error("token is malformed")]
    Malformed,
    #[error("expected a {expected} token, got {actual}")]
    WrongKind {
        expected: TokenKind,
        actual: TokenKind,
    },
    #[error("failed to sign token: {0}")]
    Signing(String),
}

/// A freshly issued access/refresh pair
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    /// Access token lifetime in seconds
    pub expires_in: i64,
}

/// Issues and validates tokens with a key fixed at construction.
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl TokenCodec {
    pub fn new(
        secret: &[u8],
        access_ttl: Duration,
        refresh_ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            access_ttl,
            refresh_ttl,
            clock,
        }
    }

    pub fn from_config(auth: &AuthConfig, clock: Arc<dyn Clock>) -> Self {
        Self::new(
            auth.jwt_secret.as_bytes(),
            Duration::hours(auth.access_token_ttl_hours),
            Duration::days(auth.refresh_token_ttl_days),
            clock,
        )
    }

    pub fn ttl(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        }
    }

    pub fn issue(
        &self,
        user_id: &str,
        username: &str,
        role: Role,
        kind: TokenKind,
    ) -> Result<String, TokenError> {
        let now = self.clock.now();
        let claims = Claims {
            sub: username.to_string(),
            uid: user_id.to_string(),
            role,
            iat: now.timestamp(),
            exp: (now + self.ttl(kind)).timestamp(),
            kind,
        };
        self.sign(&claims)
    }

    pub fn issue_pair(
        &self,
        user_id: &str,
        username: &str,
        role: Role,
    ) -> Result<TokenPair, TokenError> {
        Ok(TokenPair {
            access_token: self.issue(user_id, username, role, TokenKind::Access)?,
            refresh_token: self.issue(user_id, username, role, TokenKind::Refresh)?,
            token_type: "Bearer",
            expires_in: self.access_ttl.num_seconds(),
        })
    }

    fn sign(&self, claims: &Claims) -> Result<String, TokenError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Verify signature and structure only
    fn decode_claims(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => TokenError::Invalid,
                _ => TokenError::Malformed,
            })
    }

    /// Full validation: signature, structure and expiry
    pub fn validate(&self, token: &str) -> Result<Claims, TokenError> {
        let claims = self.decode_claims(token)?;
        if claims.exp <= self.clock.now().timestamp() {
            return Err(TokenError::Expired);
        }
        if claims.exp <= claims.iat {
            return Err(TokenError::Invalid);
        }
        Ok(claims)
    }

    pub fn validate_kind(&self, token: &str, expected: TokenKind) -> Result<Claims, TokenError> {
        let claims = self.validate(token)?;
        if claims.kind != expected {
            return Err(TokenError::WrongKind {
                expected,
                actual: claims.kind,
            });
        }
        Ok(claims)
    }

    // Projections below ignore expiry but still require a token this codec signed.

    pub fn extract_user_id(&self, token: &str) -> Result<String, TokenError> {
        self.decode_claims(token)
            .map(|c| c.uid)
            .map_err(|_| TokenError::Malformed)
    }

    pub fn extract_username(&self, token: &str) -> Result<String, TokenError> {
        self.decode_claims(token)
            .map(|c| c.sub)
            .map_err(|_| TokenError::Malformed)
    }

    pub fn extract_role(&self, token: &str) -> Result<Role, TokenError> {
        self.decode_claims(token)
            .map(|c| c.role)
            .map_err(|_| TokenError::Malformed)
    }
}
