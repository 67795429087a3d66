//! Recording and maintaining reviewer evaluations.
//!
//! Every write that carries a recommendation is fed to the proposal
//! lifecycle in the same transaction, so an approving evaluation and the
//! resulting APPROVED status are stored together or not at all.

use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use super::error::{ReviewError, ReviewResult};
use super::events::{ReviewEvent, StatusChange};
use super::lifecycle::apply_event;
use crate::auth::Principal;
use crate::clock::{format_timestamp, Clock};
use crate::db::{
    self, is_unique_violation, DbPool, Evaluation, Proposal, Recommendation, Role, Scores, User,
};
use crate::notifications::{self, Notifier};

/// The reviewer-supplied part of an evaluation
#[derive(Debug, Clone, Deserialize)]
pub struct EvaluationDetails {
    pub evaluation_stage: Option<String>,
    #[serde(default)]
    pub scores: Scores,
    pub comments: Option<String>,
    pub recommendation: Recommendation,
    pub is_final: Option<bool>,
    pub conflict_of_interest: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EvaluationSubmission {
    pub proposal_id: String,
    pub reviewer_id: String,
    #[serde(flatten)]
    pub details: EvaluationDetails,
}

pub struct EvaluationGate {
    db: DbPool,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
}

impl EvaluationGate {
    pub fn new(db: DbPool, clock: Arc<dyn Clock>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            db,
            clock,
            notifier,
        }
    }

    /// Store a reviewer's evaluation of a proposal.
    ///
    /// The reviewer's assignment is left untouched; marking it completed is a
    /// separate step.
    pub async fn record(
        &self,
        submission: EvaluationSubmission,
        actor: &Principal,
    ) -> ReviewResult<Evaluation> {
        ensure_own(&submission.reviewer_id, actor)?;
        check_scores(&submission.details.scores)?;

        let now = format_timestamp(self.clock.now());
        let mut tx = db::begin_write(&self.db).await?;

        let proposal = Proposal::find_by_id(&mut *tx, &submission.proposal_id)
            .await?
            .ok_or_else(|| ReviewError::not_found("proposal", &submission.proposal_id))?;
        let reviewer = User::find_by_id(&mut *tx, &submission.reviewer_id)
            .await?
            .ok_or_else(|| ReviewError::not_found("reviewer", &submission.reviewer_id))?;

        let duplicate = || ReviewError::DuplicateEvaluation {
            proposal_id: proposal.id.clone(),
            reviewer_id: reviewer.id.clone(),
        };
        if Evaluation::exists_for_pair(&mut *tx, &proposal.id, &reviewer.id).await? {
            return Err(duplicate());
        }

        let details = submission.details;
        let mut evaluation = Evaluation {
            id: uuid::Uuid::new_v4().to_string(),
            proposal_id: proposal.id.clone(),
            reviewer_id: reviewer.id.clone(),
            evaluation_stage: details.evaluation_stage,
            technical_score: None,
            innovation_score: None,
            feasibility_score: None,
            budget_score: None,
            impact_score: None,
            overall_score: None,
            comments: details.comments,
            recommendation: details.recommendation.to_string(),
            is_final: details.is_final.unwrap_or(false) as i32,
            conflict_of_interest: details.conflict_of_interest.unwrap_or(false) as i32,
            evaluation_date: now.clone(),
            updated_at: now.clone(),
        };
        evaluation.set_scores(details.scores);

        Evaluation::insert(&mut *tx, &evaluation)
            .await
            .map_err(|e| if is_unique_violation(&e) { duplicate() } else { e.into() })?;

        let change = apply_event(&mut *tx, &recorded(&evaluation), &now).await?;
        tx.commit().await?;

        info!(
            evaluation_id = %evaluation.id,
            proposal_id = %evaluation.proposal_id,
            reviewer = %reviewer.username,
            recommendation = %details.recommendation,
            "Evaluation recorded"
        );

        self.announce(change).await;
        Ok(evaluation)
    }

    /// Replace the reviewer-supplied fields. The recommendation is applied to
    /// the proposal again, so switching to APPROVE approves it.
    pub async fn update(
        &self,
        evaluation_id: &str,
        details: EvaluationDetails,
        actor: &Principal,
    ) -> ReviewResult<Evaluation> {
        check_scores(&details.scores)?;

        let now = format_timestamp(self.clock.now());
        let mut tx = db::begin_write(&self.db).await?;

        let mut evaluation = Evaluation::find_by_id(&mut *tx, evaluation_id)
            .await?
            .ok_or_else(|| ReviewError::not_found("evaluation", evaluation_id))?;
        ensure_own(&evaluation.reviewer_id, actor)?;

        evaluation.evaluation_stage = details.evaluation_stage;
        evaluation.set_scores(details.scores);
        evaluation.comments = details.comments;
        evaluation.recommendation = details.recommendation.to_string();
        if let Some(is_final) = details.is_final {
            evaluation.is_final = is_final as i32;
        }
        if let Some(conflict) = details.conflict_of_interest {
            evaluation.conflict_of_interest = conflict as i32;
        }
        evaluation.updated_at = now.clone();

        Evaluation::save(&mut *tx, &evaluation).await?;
        let change = apply_event(&mut *tx, &recorded(&evaluation), &now).await?;
        tx.commit().await?;

        info!(
            evaluation_id = %evaluation.id,
            actor = %actor.username,
            recommendation = %details.recommendation,
            "Evaluation updated"
        );

        self.announce(change).await;
        Ok(evaluation)
    }

    /// Lock the evaluation as final; finalizing twice is refused
    pub async fn finalize(&self, evaluation_id: &str, actor: &Principal) -> ReviewResult<Evaluation> {
        let mut evaluation = self.find(evaluation_id).await?;
        ensure_own(&evaluation.reviewer_id, actor)?;
        if evaluation.is_final() {
            return Err(ReviewError::invalid_state("evaluation", "finalize", "FINAL"));
        }
        self.set_final(&mut evaluation, true).await?;
        Ok(evaluation)
    }

    pub async fn unfinalize(
        &self,
        evaluation_id: &str,
        actor: &Principal,
    ) -> ReviewResult<Evaluation> {
        let mut evaluation = self.find(evaluation_id).await?;
        ensure_own(&evaluation.reviewer_id, actor)?;
        self.set_final(&mut evaluation, false).await?;
        Ok(evaluation)
    }

    async fn set_final(&self, evaluation: &mut Evaluation, is_final: bool) -> ReviewResult<()> {
        evaluation.is_final = is_final as i32;
        evaluation.updated_at = format_timestamp(self.clock.now());
        Evaluation::save(&self.db, evaluation).await?;
        info!(evaluation_id = %evaluation.id, is_final, "Evaluation finality changed");
        Ok(())
    }

    /// Remove an evaluation. The proposal status is not recomputed.
    pub async fn delete(&self, evaluation_id: &str) -> ReviewResult<()> {
        if !Evaluation::delete(&self.db, evaluation_id).await? {
            return Err(ReviewError::not_found("evaluation", evaluation_id));
        }
        info!(evaluation_id = %evaluation_id, "Evaluation deleted");
        Ok(())
    }

    pub async fn find(&self, evaluation_id: &str) -> ReviewResult<Evaluation> {
        Evaluation::find_by_id(&self.db, evaluation_id)
            .await?
            .ok_or_else(|| ReviewError::not_found("evaluation", evaluation_id))
    }

    pub async fn list(&self) -> ReviewResult<Vec<Evaluation>> {
        Ok(Evaluation::list(&self.db).await?)
    }

    pub async fn for_proposal(&self, proposal_id: &str) -> ReviewResult<Vec<Evaluation>> {
        Ok(Evaluation::list_for_proposal(&self.db, proposal_id).await?)
    }

    pub async fn for_reviewer(&self, reviewer_id: &str) -> ReviewResult<Vec<Evaluation>> {
        Ok(Evaluation::list_for_reviewer(&self.db, reviewer_id).await?)
    }

    async fn announce(&self, change: Option<StatusChange>) {
        if let Some(change) = change {
            let notice = notifications::status_changed(&change.proposal, change.from, change.to);
            notifications::dispatch(self.notifier.as_ref(), vec![notice]).await;
        }
    }
}

fn recorded(evaluation: &Evaluation) -> ReviewEvent {
    ReviewEvent::EvaluationRecorded {
        proposal_id: evaluation.proposal_id.clone(),
        evaluation_id: evaluation.id.clone(),
        reviewer_id: evaluation.reviewer_id.clone(),
        recommendation: evaluation.recommendation(),
    }
}

fn check_scores(scores: &Scores) -> ReviewResult<()> {
    let bad = scores.out_of_range();
    if bad.is_empty() {
        Ok(())
    } else {
        Err(ReviewError::InvalidScores(bad))
    }
}

/// Reviewers only write evaluations under their own id
fn ensure_own(reviewer_id: &str, actor: &Principal) -> ReviewResult<()> {
    if actor.is(Role::Reviewer) && reviewer_id != actor.user_id {
        return Err(ReviewError::forbidden(
            "Reviewers may only manage their own evaluations",
        ));
    }
    Ok(())
}
