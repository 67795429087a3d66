use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use super::token::{TokenCodec, TokenError, TokenKind};
use crate::db::{DbPool, Role, User};

/// The authenticated caller of a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: String,
    pub username: String,
    pub role: Role,
}

impl Principal {
    pub fn has_any_role(&self, roles: &[Role]) -> bool {
        roles.contains(&self.role)
    }

    pub fn is(&self, role: Role) -> bool {
        self.role == role
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing or malformed Authorization header")]
    MissingCredentials,
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error("token does not belong to a known user")]
    UnknownUser,
    #[error("account is deactivated")]
    AccountInactive,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Turns an `Authorization` header into a [`Principal`] backed by the users table.
#[derive(Clone)]
pub struct PrincipalResolver {
    db: DbPool,
    tokens: Arc<TokenCodec>,
}

impl PrincipalResolver {
    pub fn new(db: DbPool, tokens: Arc<TokenCodec>) -> Self {
        Self { db, tokens }
    }

    pub async fn resolve(&self, authorization: Option<&str>) -> Result<Principal, AuthError> {
        let token = authorization
            .and_then(bearer_token)
            .ok_or(AuthError::MissingCredentials)?;

        let claims = self.tokens.validate_kind(token, TokenKind::Access)?;

        let user = User::find_by_id(&self.db, &claims.uid)
            .await?
            .ok_or(AuthError::UnknownUser)?;

        if user.username != claims.sub {
            debug!(user_id = %user.id, "token subject does not match stored username");
            return Err(AuthError::UnknownUser);
        }
        if !user.active() {
            return Err(AuthError::AccountInactive);
        }

        // The stored role is authoritative, so role changes apply without re-login
        Ok(Principal {
            role: user.role(),
            user_id: user.id,
            username: user.username,
        })
    }
}

/// Strip the `Bearer ` scheme; anything else is not a credential we accept
pub fn bearer_token(header: &str) -> Option<&str> {
    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}
