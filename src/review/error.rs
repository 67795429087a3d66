use thiserror::Error;

use crate::db::Role;

#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("{0}")]
    Forbidden(String),

    #[error("cannot {action} a {entity} in status {current}")]
    InvalidState {
        entity: &'static str,
        action: &'static str,
        current: String,
    },

    #[error("user {user_id} has role {actual}, expected {expected}")]
    InvalidRole {
        user_id: String,
        expected: Role,
        actual: Role,
    },

    #[error("reviewer {reviewer_id} is already assigned to proposal {proposal_id}")]
    DuplicateAssignment {
        proposal_id: String,
        reviewer_id: String,
    },

    #[error("reviewer {reviewer_id} has already evaluated proposal {proposal_id}")]
    DuplicateEvaluation {
        proposal_id: String,
        reviewer_id: String,
    },

    #[error("{0}")]
    InvalidOperation(String),

    #[error("scores out of range (0 to 10): {}", .0.join(", "))]
    InvalidScores(Vec<&'static str>),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl ReviewError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        ReviewError::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ReviewError::Forbidden(message.into())
    }

    pub fn invalid_state(
        entity: &'static str,
        action: &'static str,
        current: impl std::fmt::Display,
    ) -> Self {
        ReviewError::InvalidState {
            entity,
            action,
            current: current.to_string(),
        }
    }
}

pub type ReviewResult<T> = Result<T, ReviewError>;
