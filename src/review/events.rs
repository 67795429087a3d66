use crate::db::{Proposal, ProposalStatus, Recommendation};

/// Facts from the assignment and evaluation side that can move a proposal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewEvent {
    ReviewersAssigned {
        proposal_id: String,
        assignment_ids: Vec<String>,
    },
    EvaluationRecorded {
        proposal_id: String,
        evaluation_id: String,
        reviewer_id: String,
        recommendation: Recommendation,
    },
}

impl ReviewEvent {
    pub fn proposal_id(&self) -> &str {
        match self {
            ReviewEvent::ReviewersAssigned { proposal_id, .. } => proposal_id,
            ReviewEvent::EvaluationRecorded { proposal_id, .. } => proposal_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ReviewEvent::ReviewersAssigned { .. } => "reviewers_assigned",
            ReviewEvent::EvaluationRecorded { .. } => "evaluation_recorded",
        }
    }
}

/// A status transition that was persisted while applying an event
#[derive(Debug, Clone)]
pub struct StatusChange {
    /// The proposal as it was after the change
    pub proposal: Proposal,
    pub from: ProposalStatus,
    pub to: ProposalStatus,
}
