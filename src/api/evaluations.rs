//! Evaluation endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::auth::Principal;
use crate::db::{Evaluation, EvaluationResponse};
use crate::review::{EvaluationDetails, EvaluationSubmission};
use crate::AppState;

use super::error::ApiError;

/// `reviewer_id` defaults to the caller
#[derive(Debug, Deserialize)]
pub struct CreateEvaluationRequest {
    pub proposal_id: String,
    pub reviewer_id: Option<String>,
    #[serde(flatten)]
    pub details: EvaluationDetails,
}

fn respond(evaluations: Vec<Evaluation>) -> Json<Vec<EvaluationResponse>> {
    Json(evaluations.into_iter().map(EvaluationResponse::from).collect())
}

pub async fn list_evaluations(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<EvaluationResponse>>, ApiError> {
    Ok(respond(state.evaluations.list().await?))
}

pub async fn create_evaluation(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Json(req): Json<CreateEvaluationRequest>,
) -> Result<(StatusCode, Json<EvaluationResponse>), ApiError> {
    let submission = EvaluationSubmission {
        proposal_id: req.proposal_id,
        reviewer_id: req
            .reviewer_id
            .unwrap_or_else(|| principal.user_id.clone()),
        details: req.details,
    };
    let evaluation = state.evaluations.record(submission, &principal).await?;
    Ok((StatusCode::CREATED, Json(evaluation.into())))
}

pub async fn get_evaluation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<EvaluationResponse>, ApiError> {
    Ok(Json(state.evaluations.find(&id).await?.into()))
}

pub async fn update_evaluation(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
    Json(details): Json<EvaluationDetails>,
) -> Result<Json<EvaluationResponse>, ApiError> {
    let evaluation = state.evaluations.update(&id, details, &principal).await?;
    Ok(Json(evaluation.into()))
}

pub async fn delete_evaluation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.evaluations.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn finalize_evaluation(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<Json<EvaluationResponse>, ApiError> {
    Ok(Json(state.evaluations.finalize(&id, &principal).await?.into()))
}

pub async fn unfinalize_evaluation(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<Json<EvaluationResponse>, ApiError> {
    Ok(Json(state.evaluations.unfinalize(&id, &principal).await?.into()))
}

pub async fn proposal_evaluations(
    State(state): State<Arc<AppState>>,
    Path(proposal_id): Path<String>,
) -> Result<Json<Vec<EvaluationResponse>>, ApiError> {
    Ok(respond(state.evaluations.for_proposal(&proposal_id).await?))
}

pub async fn reviewer_evaluations(
    State(state): State<Arc<AppState>>,
    Path(reviewer_id): Path<String>,
) -> Result<Json<Vec<EvaluationResponse>>, ApiError> {
    Ok(respond(state.evaluations.for_reviewer(&reviewer_id).await?))
}
