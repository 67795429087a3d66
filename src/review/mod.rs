//! Proposal review workflow: lifecycle, reviewer assignments and evaluations.

pub mod assignments;
mod error;
pub mod evaluations;
mod events;
pub mod lifecycle;

pub use assignments::{AssignmentRequest, ReviewerAssignmentManager};
pub use error::{ReviewError, ReviewResult};
pub use evaluations::{EvaluationDetails, EvaluationGate, EvaluationSubmission};
pub use events::{ReviewEvent, StatusChange};
pub use lifecycle::{ProposalDraft, ProposalLifecycle};
