//! Proposal endpoints. Status rules live in `review::lifecycle`.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::auth::Principal;
use crate::db::ProposalResponse;
use crate::review::ProposalDraft;
use crate::AppState;

use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::{
    validate_abstract, validate_department_id, validate_requested_amount, validate_title,
};

#[derive(Debug, Serialize)]
pub struct CanDeleteResponse {
    pub can_delete: bool,
}

fn validate_draft(draft: &ProposalDraft) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    if let Err(e) = validate_title(&draft.title) {
        errors.add("title", e);
    }
    if let Err(e) = validate_abstract(&draft.abstract_text) {
        errors.add("abstract", e);
    }
    if let Err(e) = validate_department_id(&draft.department_id) {
        errors.add("department_id", e);
    }
    if let Err(e) = validate_requested_amount(draft.requested_amount) {
        errors.add("requested_amount", e);
    }

    errors.finish()
}

pub async fn list_proposals(
    State(state): State<Arc<AppState>>,
    principal: Principal,
) -> Result<Json<Vec<ProposalResponse>>, ApiError> {
    let proposals = state.lifecycle.list_for(&principal).await?;
    Ok(Json(proposals.into_iter().map(ProposalResponse::from).collect()))
}

pub async fn create_proposal(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Json(draft): Json<ProposalDraft>,
) -> Result<(StatusCode, Json<ProposalResponse>), ApiError> {
    validate_draft(&draft)?;
    let proposal = state.lifecycle.create(&principal.user_id, draft).await?;
    Ok((StatusCode::CREATED, Json(proposal.into())))
}

pub async fn my_assigned_proposals(
    State(state): State<Arc<AppState>>,
    principal: Principal,
) -> Result<Json<Vec<ProposalResponse>>, ApiError> {
    let proposals = state.lifecycle.assigned_to(&principal.user_id).await?;
    Ok(Json(proposals.into_iter().map(ProposalResponse::from).collect()))
}

pub async fn get_proposal(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<Json<ProposalResponse>, ApiError> {
    Ok(Json(state.lifecycle.get_for(&id, &principal).await?.into()))
}

pub async fn update_proposal(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
    Json(draft): Json<ProposalDraft>,
) -> Result<Json<ProposalResponse>, ApiError> {
    validate_draft(&draft)?;
    Ok(Json(state.lifecycle.update(&id, draft, &principal).await?.into()))
}

pub async fn submit_proposal(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<Json<ProposalResponse>, ApiError> {
    Ok(Json(state.lifecycle.submit(&id, &principal).await?.into()))
}

pub async fn withdraw_proposal(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<Json<ProposalResponse>, ApiError> {
    Ok(Json(state.lifecycle.withdraw(&id, &principal).await?.into()))
}

pub async fn soft_delete_proposal(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<Json<ProposalResponse>, ApiError> {
    Ok(Json(state.lifecycle.soft_delete(&id, &principal).await?.into()))
}

pub async fn can_delete_proposal(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<CanDeleteResponse>, ApiError> {
    let can_delete = state.lifecycle.can_delete(&id).await?;
    Ok(Json(CanDeleteResponse { can_delete }))
}

pub async fn delete_proposal(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.lifecycle.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}
