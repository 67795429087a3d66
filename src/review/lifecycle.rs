//! Proposal status state machine.
//!
//! ```text
//! DRAFT -> SUBMITTED -> UNDER_REVIEW -> APPROVED | REJECTED
//!   \________\______________\______-> WITHDRAWN
//! ```
//!
//! Transition rules live in pure functions so they can be checked without a
//! database. [`ProposalLifecycle`] wraps them with loading, persistence and
//! ownership checks; [`apply_event`] is how assignment and evaluation work
//! moves a proposal forward.

use serde::Deserialize;
use sqlx::SqliteConnection;
use std::sync::Arc;
use tracing::{info, warn};

use super::error::{ReviewError, ReviewResult};
use super::events::{ReviewEvent, StatusChange};
use crate::auth::Principal;
use crate::clock::{format_timestamp, Clock};
use crate::db::{
    self, Assignment, DbPool, Evaluation, NewProposal, Notification, Project, Proposal,
    ProposalStatus, Recommendation, Role,
};

/// Status a proposal moves to when `event` is applied in `current`.
///
/// An approving evaluation approves the proposal outright, whatever its
/// current status. There is no matching rule for rejection.
pub fn next_status(current: ProposalStatus, event: &ReviewEvent) -> ProposalStatus {
    match event {
        ReviewEvent::ReviewersAssigned { .. } => match current {
            ProposalStatus::Submitted => ProposalStatus::UnderReview,
            other => other,
        },
        ReviewEvent::EvaluationRecorded {
            recommendation: Recommendation::Approve,
            ..
        } => ProposalStatus::Approved,
        ReviewEvent::EvaluationRecorded { .. } => current,
    }
}

pub fn submit_target(current: ProposalStatus) -> ReviewResult<ProposalStatus> {
    match current {
        ProposalStatus::Draft => Ok(ProposalStatus::Submitted),
        other => Err(ReviewError::invalid_state("proposal", "submit", other)),
    }
}

/// Withdrawal is refused only once a decision has been made
pub fn withdraw_target(current: ProposalStatus) -> ReviewResult<ProposalStatus> {
    if current.is_decided() {
        return Err(ReviewError::invalid_state("proposal", "withdraw", current));
    }
    Ok(ProposalStatus::Withdrawn)
}

/// Why a proposal may not be hard-deleted, if anything prevents it
pub fn deletion_blocker(status: ProposalStatus, has_project: bool) -> Option<&'static str> {
    match status {
        ProposalStatus::UnderReview => Some("Cannot delete a proposal that is under review"),
        ProposalStatus::Approved if has_project => {
            Some("Cannot delete an approved proposal that already has a project")
        }
        _ => None,
    }
}

/// Apply a review event inside the caller's transaction.
///
/// Returns the persisted change, or `None` when the status stays the same.
pub async fn apply_event(
    conn: &mut SqliteConnection,
    event: &ReviewEvent,
    now: &str,
) -> ReviewResult<Option<StatusChange>> {
    let mut proposal = Proposal::find_by_id(&mut *conn, event.proposal_id())
        .await?
        .ok_or_else(|| ReviewError::not_found("proposal", event.proposal_id()))?;

    let from = proposal.status();
    let to = next_status(from, event);
    if from == to {
        return Ok(None);
    }

    if from.is_terminal() {
        warn!(
            proposal_id = %proposal.id,
            event = event.name(),
            "Approving evaluation overrides terminal status {}",
            from
        );
    }

    Proposal::set_status(&mut *conn, &proposal.id, to, now).await?;
    proposal.status = to.to_string();
    proposal.updated_at = now.to_string();

    info!(
        proposal_id = %proposal.id,
        event = event.name(),
        "Proposal status {} -> {}",
        from,
        to
    );

    Ok(Some(StatusChange { proposal, from, to }))
}

/// Fields a caller supplies when opening a proposal
#[derive(Debug, Clone, Deserialize)]
pub struct ProposalDraft {
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub department_id: String,
    pub requested_amount: Option<f64>,
}

#[derive(Clone)]
pub struct ProposalLifecycle {
    db: DbPool,
    clock: Arc<dyn Clock>,
}

impl ProposalLifecycle {
    pub fn new(db: DbPool, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    fn now(&self) -> String {
        format_timestamp(self.clock.now())
    }

    /// Open a DRAFT proposal with the creator as principal investigator
    pub async fn create(&self, creator_id: &str, draft: ProposalDraft) -> ReviewResult<Proposal> {
        let new = NewProposal {
            title: draft.title,
            abstract_text: draft.abstract_text,
            principal_investigator_id: creator_id.to_string(),
            department_id: draft.department_id,
            created_by: creator_id.to_string(),
            requested_amount: draft.requested_amount,
        };
        let proposal = Proposal::create(&self.db, &new, &self.now()).await?;
        info!(proposal_id = %proposal.id, "Proposal created by {}", creator_id);
        Ok(proposal)
    }

    pub async fn get(&self, id: &str) -> ReviewResult<Proposal> {
        Proposal::find_by_id(&self.db, id)
            .await?
            .ok_or_else(|| ReviewError::not_found("proposal", id))
    }

    /// Fetch on behalf of a caller; reviewers only see proposals they are assigned to
    pub async fn get_for(&self, id: &str, viewer: &Principal) -> ReviewResult<Proposal> {
        if viewer.is(Role::Reviewer)
            && !Assignment::exists_for_pair(&self.db, id, &viewer.user_id).await?
        {
            return Err(ReviewError::forbidden(
                "Reviewers may only view proposals assigned to them",
            ));
        }
        self.get(id).await
    }

    /// Principal investigators and project managers see their own proposals; other roles see all
    pub async fn list_for(&self, viewer: &Principal) -> ReviewResult<Vec<Proposal>> {
        let proposals = match viewer.role {
            Role::PrincipalInvestigator | Role::ProjectManager => {
                Proposal::list_for_user(&self.db, &viewer.user_id).await?
            }
            _ => Proposal::list(&self.db).await?,
        };
        Ok(proposals)
    }

    pub async fn assigned_to(&self, reviewer_id: &str) -> ReviewResult<Vec<Proposal>> {
        Ok(Proposal::list_assigned_to(&self.db, reviewer_id).await?)
    }

    /// Replace a draft's details. Proposals past DRAFT are no longer editable.
    pub async fn update(
        &self,
        id: &str,
        draft: ProposalDraft,
        actor: &Principal,
    ) -> ReviewResult<Proposal> {
        let now = self.now();
        let mut tx = db::begin_write(&self.db).await?;

        let proposal = Proposal::find_by_id(&mut *tx, id)
            .await?
            .ok_or_else(|| ReviewError::not_found("proposal", id))?;
        ensure_may_act_on(&proposal, actor)?;
        if proposal.status() != ProposalStatus::Draft {
            return Err(ReviewError::invalid_state("proposal", "edit", proposal.status()));
        }

        Proposal::update_details(
            &mut *tx,
            id,
            &draft.title,
            draft.abstract_text.as_deref(),
            &draft.department_id,
            draft.requested_amount,
            &now,
        )
        .await?;
        let updated = Proposal::find_by_id(&mut *tx, id)
            .await?
            .ok_or_else(|| ReviewError::not_found("proposal", id))?;
        tx.commit().await?;

        info!(proposal_id = %id, actor = %actor.username, "Proposal details updated");
        Ok(updated)
    }

    pub async fn submit(&self, id: &str, actor: &Principal) -> ReviewResult<Proposal> {
        self.transition(id, actor, "submit", submit_target).await
    }

    pub async fn withdraw(&self, id: &str, actor: &Principal) -> ReviewResult<Proposal> {
        self.transition(id, actor, "withdraw", withdraw_target).await
    }

    /// Retire a proposal without deleting it. Approved proposals stay put.
    pub async fn soft_delete(&self, id: &str, actor: &Principal) -> ReviewResult<Proposal> {
        self.transition(id, actor, "soft-delete", |current| {
            if current == ProposalStatus::Approved {
                return Err(ReviewError::InvalidOperation(
                    "Cannot soft-delete an approved proposal".to_string(),
                ));
            }
            Ok(ProposalStatus::Withdrawn)
        })
        .await
    }

    async fn transition<F>(
        &self,
        id: &str,
        actor: &Principal,
        action: &'static str,
        target: F,
    ) -> ReviewResult<Proposal>
    where
        F: FnOnce(ProposalStatus) -> ReviewResult<ProposalStatus>,
    {
        let now = self.now();
        let mut tx = db::begin_write(&self.db).await?;

        let mut proposal = Proposal::find_by_id(&mut *tx, id)
            .await?
            .ok_or_else(|| ReviewError::not_found("proposal", id))?;
        ensure_may_act_on(&proposal, actor)?;

        let from = proposal.status();
        let to = target(from)?;

        Proposal::set_status(&mut *tx, id, to, &now).await?;
        tx.commit().await?;

        info!(
            proposal_id = %id,
            actor = %actor.username,
            "Proposal {}: {} -> {}",
            action,
            from,
            to
        );

        proposal.status = to.to_string();
        proposal.updated_at = now;
        Ok(proposal)
    }

    pub async fn can_delete(&self, id: &str) -> ReviewResult<bool> {
        let proposal = self.get(id).await?;
        let has_project = Project::exists_for_proposal(&self.db, id).await?;
        Ok(deletion_blocker(proposal.status(), has_project).is_none())
    }

    /// Hard delete, together with the proposal's assignments, evaluations and notifications
    pub async fn delete(&self, id: &str) -> ReviewResult<()> {
        let mut tx = db::begin_write(&self.db).await?;

        let proposal = Proposal::find_by_id(&mut *tx, id)
            .await?
            .ok_or_else(|| ReviewError::not_found("proposal", id))?;
        let has_project = Project::exists_for_proposal(&mut *tx, id).await?;
        if let Some(reason) = deletion_blocker(proposal.status(), has_project) {
            return Err(ReviewError::InvalidOperation(reason.to_string()));
        }

        let evaluations = Evaluation::delete_for_proposal(&mut *tx, id).await?;
        let assignments = Assignment::delete_for_proposal(&mut *tx, id).await?;
        Notification::delete_for_proposal(&mut *tx, id).await?;
        Proposal::delete(&mut *tx, id).await?;
        tx.commit().await?;

        info!(
            proposal_id = %id,
            evaluations,
            assignments,
            "Proposal deleted"
        );
        Ok(())
    }
}

/// Principal investigators may only act on their own proposals
fn ensure_may_act_on(proposal: &Proposal, actor: &Principal) -> ReviewResult<()> {
    if actor.is(Role::PrincipalInvestigator) && !proposal.is_owned_by(&actor.user_id) {
        return Err(ReviewError::forbidden(
            "Only the principal investigator of this proposal may do that",
        ));
    }
    Ok(())
}
