//! Token endpoints, the authorization middleware and the `Principal` extractor.

use axum::{
    async_trait,
    body::Body,
    extract::{FromRequestParts, State},
    http::{header::AUTHORIZATION, request::Parts, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::auth::{
    hash_password, verify_password, Access, Decision, Principal, TokenKind, TokenPair,
};
use crate::clock::format_timestamp;
use crate::db::{is_unique_violation, NewUser, Role, User, UserResponse};
use crate::AppState;

use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::{validate_email, validate_name, validate_password, validate_username};

/// Accepts either the username or the email address as `username`
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub department_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct RoleUpdateRequest {
    pub user_id: String,
    pub role: Role,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    #[serde(flatten)]
    pub tokens: TokenPair,
    pub user: UserResponse,
}

/// Default role for self-registered accounts; other roles are granted by an administrator
const REGISTRATION_ROLE: Role = Role::PrincipalInvestigator;

/// Login endpoint
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let user = User::find_by_login(&state.db, &request.username)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid username or password"))?;

    if !verify_password(&request.password, &user.password_hash) {
        warn!(username = %request.username, "Failed login attempt");
        return Err(ApiError::unauthorized("Invalid username or password"));
    }
    if !user.active() {
        return Err(ApiError::unauthorized("Account is deactivated"));
    }

    User::touch_last_login(&state.db, &user.id, &format_timestamp(state.clock.now())).await?;
    let tokens = state.tokens.issue_pair(&user.id, &user.username, user.role())?;

    info!(user_id = %user.id, username = %user.username, "User logged in");
    Ok(Json(AuthResponse {
        tokens,
        user: user.into(),
    }))
}

/// Create a PRINCIPAL_INVESTIGATOR account and sign it in
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if let Err(e) = validate_username(&request.username) {
        errors.add("username", e);
    }
    if let Err(e) = validate_email(&request.email) {
        errors.add("email", e);
    }
    if let Err(e) = validate_password(&request.password) {
        errors.add("password", e);
    }
    if let Err(e) = validate_name(&request.first_name, "First name") {
        errors.add("first_name", e);
    }
    if let Err(e) = validate_name(&request.last_name, "Last name") {
        errors.add("last_name", e);
    }
    errors.finish()?;

    let user = create_account(
        &state,
        &request.username,
        &request.email,
        &request.password,
        request.first_name.clone(),
        request.last_name.clone(),
        REGISTRATION_ROLE,
        request.department_id.clone(),
    )
    .await?;
    let tokens = state.tokens.issue_pair(&user.id, &user.username, user.role())?;

    info!(user_id = %user.id, username = %user.username, "User registered");
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            tokens,
            user: user.into(),
        }),
    ))
}

/// Insert a user after checking username and email are free
#[allow(clippy::too_many_arguments)]
pub(super) async fn create_account(
    state: &AppState,
    username: &str,
    email: &str,
    password: &str,
    first_name: Option<String>,
    last_name: Option<String>,
    role: Role,
    department_id: Option<String>,
) -> Result<User, ApiError> {
    if User::find_by_username(&state.db, username).await?.is_some() {
        return Err(ApiError::conflict("Username is already taken"));
    }
    if User::find_by_login(&state.db, email).await?.is_some() {
        return Err(ApiError::conflict("Email is already registered"));
    }

    let password_hash = hash_password(password).map_err(|e| {
        tracing::error!("Failed to hash password: {}", e);
        ApiError::internal("Failed to create account")
    })?;

    let new = NewUser {
        username: username.to_string(),
        email: email.to_string(),
        password_hash,
        first_name,
        last_name,
        role,
        department_id,
    };
    User::create(&state.db, &new, &format_timestamp(state.clock.now()))
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                ApiError::conflict("Username or email is already registered")
            } else {
                e.into()
            }
        })
}

/// Exchange a refresh token for a new pair. Inactive accounts cannot refresh.
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let claims = state
        .tokens
        .validate_kind(&request.refresh_token, TokenKind::Refresh)?;

    let user = User::find_by_id(&state.db, &claims.uid)
        .await?
        .filter(|u| u.username == claims.sub)
        .ok_or_else(|| ApiError::unauthorized("Invalid token"))?;
    if !user.active() {
        return Err(ApiError::unauthorized("Account is deactivated"));
    }

    let tokens = state.tokens.issue_pair(&user.id, &user.username, user.role())?;
    Ok(Json(AuthResponse {
        tokens,
        user: user.into(),
    }))
}

/// Tokens are stateless, so logging out only records the event; the client discards its tokens
pub async fn logout(principal: Principal) -> StatusCode {
    info!(user_id = %principal.user_id, username = %principal.username, "User logged out");
    StatusCode::NO_CONTENT
}

/// Change a user's role. Administrators cannot demote themselves.
pub async fn update_role(
    State(state): State<Arc<AppState>>,
    admin: Principal,
    Json(request): Json<RoleUpdateRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    if request.user_id == admin.user_id && request.role != Role::Admin {
        return Err(ApiError::bad_request("Administrators cannot demote themselves"));
    }

    let now = format_timestamp(state.clock.now());
    if !User::set_role(&state.db, &request.user_id, request.role, &now).await? {
        return Err(ApiError::not_found("User not found"));
    }
    let user = User::find_by_id(&state.db, &request.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    info!(
        user_id = %user.id,
        changed_by = %admin.username,
        "Role changed to {}",
        request.role
    );
    Ok(Json(user.into()))
}

/// Authorization middleware.
///
/// Runs the route matrix before any handler. Public routes pass straight
/// through; everything else needs a valid access token and a permitted role.
/// The resolved [`Principal`] is stored in the request extensions.
pub async fn authorize(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    if state.matrix.decision_for(&method, &path) == Decision::PermitAll {
        return next.run(request).await;
    }

    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());
    let principal = match state.resolver.resolve(header).await {
        Ok(principal) => principal,
        Err(e) => {
            tracing::debug!(%method, %path, error = %e, "Rejected unauthenticated request");
            return ApiError::from(e).into_response();
        }
    };

    match state.matrix.authorize(Some(&principal), &method, &path) {
        Access::Allow => {
            request.extensions_mut().insert(principal);
            next.run(request).await
        }
        Access::Deny(denial) => {
            warn!(
                %method,
                %path,
                username = %principal.username,
                role = %principal.role,
                "Request denied by route matrix"
            );
            ApiError::from(denial).into_response()
        }
    }
}

/// Extractor for the caller resolved by [`authorize`]
#[async_trait]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}
