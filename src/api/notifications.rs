//! The caller's own in-app notifications.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::auth::Principal;
use crate::db::{Notification, NotificationResponse};
use crate::AppState;

use super::error::ApiError;

#[derive(Debug, Default, Deserialize)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread_only: bool,
}

pub async fn list_notifications(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Query(query): Query<NotificationQuery>,
) -> Result<Json<Vec<NotificationResponse>>, ApiError> {
    let notifications =
        Notification::list_for_user(&state.db, &principal.user_id, query.unread_only).await?;
    Ok(Json(
        notifications
            .into_iter()
            .map(NotificationResponse::from)
            .collect(),
    ))
}

/// Someone else's notification is reported as missing
pub async fn mark_read(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if !Notification::mark_read(&state.db, &id, &principal.user_id).await? {
        return Err(ApiError::not_found("Notification not found"));
    }
    Ok(StatusCode::NO_CONTENT)
}
