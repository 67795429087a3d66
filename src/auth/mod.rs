//! Authentication and authorization core: tokens, principals and the route matrix.

pub mod matrix;
pub mod password;
pub mod principal;
pub mod token;

pub use matrix::{Access, AuthorizationMatrix, Decision, Denial};
pub use password::{hash_password, password_strength_problem, verify_password};
pub use principal::{bearer_token, AuthError, Principal, PrincipalResolver};
pub use token::{Claims, TokenCodec, TokenError, TokenKind, TokenPair};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::clock::{format_timestamp, Clock};
use crate::config::AuthConfig;
use crate::db::{DbPool, NewUser, Role, User};

/// Create the configured bootstrap administrator if it does not exist yet.
pub async fn ensure_admin_user(db: &DbPool, auth: &AuthConfig, clock: &dyn Clock) -> Result<()> {
    let Some(password) = auth.admin_password.as_deref() else {
        return Ok(());
    };

    if let Some(existing) = User::find_by_username(db, &auth.admin_username).await? {
        if existing.role() != Role::Admin {
            warn!(
                "Bootstrap admin '{}' exists with role {}; leaving it unchanged",
                existing.username,
                existing.role()
            );
        }
        return Ok(());
    }

    if let Some(problem) = password_strength_problem(password) {
        warn!("Configured admin password is weak: {}", problem);
    }

    let password_hash = hash_password(password)
        .map_err(|e| anyhow::anyhow!("Failed to hash admin password: {}", e))?;

    let new = NewUser {
        username: auth.admin_username.clone(),
        email: auth.admin_email.clone(),
        password_hash,
        first_name: None,
        last_name: None,
        role: Role::Admin,
        department_id: None,
    };
    User::create(db, &new, &format_timestamp(clock.now()))
        .await
        .context("Failed to create bootstrap admin user")?;

    info!("Created bootstrap admin user '{}'", auth.admin_username);
    Ok(())
}
