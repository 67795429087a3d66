//! User directory and profile endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use crate::auth::Principal;
use crate::clock::format_timestamp;
use crate::db::{Role, User, UserChanges, UserResponse};
use crate::AppState;

use super::auth::create_account;
use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::{
    validate_department_id, validate_email, validate_name, validate_password, validate_username,
};

/// Administrator-created account with an explicit role
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Role,
    pub department_id: Option<String>,
}

fn validate_changes(changes: &UserChanges) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if let Some(email) = &changes.email {
        if let Err(e) = validate_email(email) {
            errors.add("email", e);
        }
    }
    if let Err(e) = validate_name(&changes.first_name, "First name") {
        errors.add("first_name", e);
    }
    if let Err(e) = validate_name(&changes.last_name, "Last name") {
        errors.add("last_name", e);
    }
    if let Some(department) = &changes.department_id {
        if let Err(e) = validate_department_id(department) {
            errors.add("department_id", e);
        }
    }
    errors.finish()
}

async fn load(state: &AppState, id: &str) -> Result<User, ApiError> {
    User::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))
}

pub async fn list_users(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<UserResponse>>, ApiError> {
    let users = User::list(&state.db).await?;
    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<UserResponse>, ApiError> {
    Ok(Json(load(&state, &id).await?.into()))
}

pub async fn create_user(
    State(state): State<Arc<AppState>>,
    admin: Principal,
    Json(req): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if let Err(e) = validate_username(&req.username) {
        errors.add("username", e);
    }
    if let Err(e) = validate_email(&req.email) {
        errors.add("email", e);
    }
    if let Err(e) = validate_password(&req.password) {
        errors.add("password", e);
    }
    errors.finish()?;

    let user = create_account(
        &state,
        &req.username,
        &req.email,
        &req.password,
        req.first_name,
        req.last_name,
        req.role,
        req.department_id,
    )
    .await?;

    info!(
        user_id = %user.id,
        created_by = %admin.username,
        "Created user with role {}",
        req.role
    );
    Ok((StatusCode::CREATED, Json(user.into())))
}

pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    principal: Principal,
) -> Result<Json<UserResponse>, ApiError> {
    Ok(Json(load(&state, &principal.user_id).await?.into()))
}

pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Json(changes): Json<UserChanges>,
) -> Result<Json<UserResponse>, ApiError> {
    apply_changes(&state, &principal.user_id, &changes).await
}

/// Anyone may edit their own profile; editing someone else needs ADMIN or DEPARTMENT_HEAD.
/// Role and active flag are never changed here.
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
    Json(changes): Json<UserChanges>,
) -> Result<Json<UserResponse>, ApiError> {
    if id != principal.user_id && !principal.role.can_manage_users() {
        return Err(ApiError::forbidden(
            "You do not have permission to perform this action",
        ));
    }
    apply_changes(&state, &id, &changes).await
}

async fn apply_changes(
    state: &AppState,
    id: &str,
    changes: &UserChanges,
) -> Result<Json<UserResponse>, ApiError> {
    validate_changes(changes)?;

    let now = format_timestamp(state.clock.now());
    if !User::update_profile(&state.db, id, changes, &now)
        .await
        .map_err(|e| {
            if crate::db::is_unique_violation(&e) {
                ApiError::conflict("Email is already registered")
            } else {
                e.into()
            }
        })?
    {
        return Err(ApiError::not_found("User not found"));
    }
    Ok(Json(load(state, id).await?.into()))
}

pub async fn activate_user(
    State(state): State<Arc<AppState>>,
    admin: Principal,
    Path(id): Path<String>,
) -> Result<Json<UserResponse>, ApiError> {
    set_active(&state, &admin, &id, true).await
}

pub async fn deactivate_user(
    State(state): State<Arc<AppState>>,
    admin: Principal,
    Path(id): Path<String>,
) -> Result<Json<UserResponse>, ApiError> {
    if id == admin.user_id {
        return Err(ApiError::bad_request("Administrators cannot deactivate themselves"));
    }
    set_active(&state, &admin, &id, false).await
}

async fn set_active(
    state: &AppState,
    admin: &Principal,
    id: &str,
    active: bool,
) -> Result<Json<UserResponse>, ApiError> {
    let now = format_timestamp(state.clock.now());
    if !User::set_active(&state.db, id, active, &now).await? {
        return Err(ApiError::not_found("User not found"));
    }
    info!(user_id = %id, changed_by = %admin.username, active, "User active flag changed");
    Ok(Json(load(state, id).await?.into()))
}
