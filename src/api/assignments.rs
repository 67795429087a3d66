//! Reviewer assignment endpoints under `/api/proposal-reviewers`.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::Principal;
use crate::db::{AssignmentResponse, AssignmentStatistics, AssignmentStatus, Role};
use crate::review::{AssignmentRequest, ReviewError};
use crate::AppState;

use super::error::ApiError;
use super::validation::validate_notes;

#[derive(Debug, Deserialize)]
pub struct AssignReviewersRequest {
    pub proposal_id: String,
    pub reviewer_ids: Vec<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: AssignmentStatus,
}

#[derive(Debug, Serialize)]
pub struct AssignmentCheck {
    pub assigned: bool,
}

fn respond(assignments: Vec<crate::db::Assignment>) -> Json<Vec<AssignmentResponse>> {
    Json(assignments.into_iter().map(AssignmentResponse::from).collect())
}

pub async fn assign_reviewers(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Json(req): Json<AssignReviewersRequest>,
) -> Result<(StatusCode, Json<Vec<AssignmentResponse>>), ApiError> {
    if req.reviewer_ids.is_empty() {
        return Err(ApiError::validation_field(
            "reviewer_ids",
            "At least one reviewer is required",
        ));
    }
    if let Err(e) = validate_notes(&req.notes) {
        return Err(ApiError::validation_field("notes", e));
    }

    let created = state
        .assignments
        .assign(AssignmentRequest {
            proposal_id: req.proposal_id,
            reviewer_ids: req.reviewer_ids,
            assigner_id: principal.user_id,
            due_date: req.due_date,
            notes: req.notes,
        })
        .await?;
    Ok((StatusCode::CREATED, respond(created)))
}

pub async fn my_assignments(
    State(state): State<Arc<AppState>>,
    principal: Principal,
) -> Result<Json<Vec<AssignmentResponse>>, ApiError> {
    Ok(respond(state.assignments.for_reviewer(&principal.user_id).await?))
}

pub async fn my_pending_assignments(
    State(state): State<Arc<AppState>>,
    principal: Principal,
) -> Result<Json<Vec<AssignmentResponse>>, ApiError> {
    Ok(respond(
        state.assignments.pending_for_reviewer(&principal.user_id).await?,
    ))
}

pub async fn my_completed_assignments(
    State(state): State<Arc<AppState>>,
    principal: Principal,
) -> Result<Json<Vec<AssignmentResponse>>, ApiError> {
    Ok(respond(
        state.assignments.completed_for_reviewer(&principal.user_id).await?,
    ))
}

/// Principal investigators only see the reviewers of their own proposals
pub async fn proposal_assignments(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(proposal_id): Path<String>,
) -> Result<Json<Vec<AssignmentResponse>>, ApiError> {
    if principal.is(Role::PrincipalInvestigator) {
        let proposal = state.lifecycle.get(&proposal_id).await?;
        if !proposal.is_owned_by(&principal.user_id) {
            return Err(ReviewError::forbidden("Not the investigator of this proposal").into());
        }
    }
    Ok(respond(state.assignments.for_proposal(&proposal_id).await?))
}

pub async fn check_assignment(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(proposal_id): Path<String>,
) -> Result<Json<AssignmentCheck>, ApiError> {
    let assigned = state
        .assignments
        .is_assigned(&proposal_id, &principal.user_id)
        .await?;
    Ok(Json(AssignmentCheck { assigned }))
}

pub async fn update_assignment_status(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<AssignmentResponse>, ApiError> {
    let updated = state
        .assignments
        .update_status(&id, req.status, &principal)
        .await?;
    Ok(Json(updated.into()))
}

pub async fn remove_assignment(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.assignments.remove(&id, &principal.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn overdue_assignments(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<AssignmentResponse>>, ApiError> {
    Ok(respond(state.assignments.overdue().await?))
}

/// Reviewers may only read their own workload
pub async fn reviewer_statistics(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(reviewer_id): Path<String>,
) -> Result<Json<AssignmentStatistics>, ApiError> {
    if principal.is(Role::Reviewer) && principal.user_id != reviewer_id {
        return Err(ReviewError::forbidden("Reviewers may only read their own statistics").into());
    }
    Ok(Json(state.assignments.statistics(&reviewer_id).await?))
}

pub async fn my_statistics(
    State(state): State<Arc<AppState>>,
    principal: Principal,
) -> Result<Json<AssignmentStatistics>, ApiError> {
    Ok(Json(state.assignments.statistics(&principal.user_id).await?))
}

pub async fn my_proposal_ids(
    State(state): State<Arc<AppState>>,
    principal: Principal,
) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(
        state
            .assignments
            .assigned_proposal_ids(&principal.user_id)
            .await?,
    ))
}
