//! Reviewer-to-proposal assignments.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;

use super::error::{ReviewError, ReviewResult};
use super::events::ReviewEvent;
use super::lifecycle::apply_event;
use crate::auth::Principal;
use crate::clock::{format_timestamp, Clock};
use crate::db::{
    self, is_unique_violation, Assignment, AssignmentStatistics, AssignmentStatus, DbPool,
    Proposal, Role, User,
};
use crate::notifications::{self, Notifier};

/// A request to put one or more reviewers on a proposal
#[derive(Debug, Clone)]
pub struct AssignmentRequest {
    pub proposal_id: String,
    pub reviewer_ids: Vec<String>,
    pub assigner_id: String,
    pub due_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

pub struct ReviewerAssignmentManager {
    db: DbPool,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
}

impl ReviewerAssignmentManager {
    pub fn new(db: DbPool, clock: Arc<dyn Clock>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            db,
            clock,
            notifier,
        }
    }

    /// Assign every listed reviewer, or none of them.
    ///
    /// Checks run in this order: the proposal exists and is SUBMITTED or
    /// UNDER_REVIEW, the assigner may hand out reviews, then per reviewer that
    /// the user exists, holds the REVIEWER role and is not already assigned.
    pub async fn assign(&self, request: AssignmentRequest) -> ReviewResult<Vec<Assignment>> {
        let now = format_timestamp(self.clock.now());
        let mut tx = db::begin_write(&self.db).await?;

        let proposal = Proposal::find_by_id(&mut *tx, &request.proposal_id)
            .await?
            .ok_or_else(|| ReviewError::not_found("proposal", &request.proposal_id))?;
        if !proposal.status().accepts_reviewers() {
            return Err(ReviewError::invalid_state(
                "proposal",
                "assign reviewers to",
                proposal.status(),
            ));
        }

        let assigner = User::find_by_id(&mut *tx, &request.assigner_id)
            .await?
            .ok_or_else(|| ReviewError::not_found("user", &request.assigner_id))?;
        if !assigner.role().can_manage_assignments() {
            return Err(ReviewError::forbidden(
                "Only committee chairs and administrators can assign reviewers",
            ));
        }

        if request.reviewer_ids.is_empty() {
            return Err(ReviewError::InvalidOperation(
                "At least one reviewer is required".to_string(),
            ));
        }

        let mut created = Vec::with_capacity(request.reviewer_ids.len());
        for reviewer_id in &request.reviewer_ids {
            let reviewer = User::find_by_id(&mut *tx, reviewer_id)
                .await?
                .ok_or_else(|| ReviewError::not_found("reviewer", reviewer_id))?;
            let actual = reviewer.role();
            if actual != Role::Reviewer {
                return Err(ReviewError::InvalidRole {
                    user_id: reviewer.id,
                    expected: Role::Reviewer,
                    actual,
                });
            }

            let duplicate = || ReviewError::DuplicateAssignment {
                proposal_id: proposal.id.clone(),
                reviewer_id: reviewer_id.clone(),
            };
            if Assignment::exists_for_pair(&mut *tx, &proposal.id, reviewer_id).await? {
                return Err(duplicate());
            }

            let assignment = Assignment {
                id: uuid::Uuid::new_v4().to_string(),
                proposal_id: proposal.id.clone(),
                reviewer_id: reviewer_id.clone(),
                assigned_by_id: assigner.id.clone(),
                assigned_date: now.clone(),
                due_date: request.due_date.map(format_timestamp),
                status: AssignmentStatus::Pending.to_string(),
                notes: request.notes.clone(),
                completed_date: None,
            };
            // A concurrent request may have inserted the pair since the check above
            Assignment::insert(&mut *tx, &assignment)
                .await
                .map_err(|e| if is_unique_violation(&e) { duplicate() } else { e.into() })?;
            created.push(assignment);
        }

        let event = ReviewEvent::ReviewersAssigned {
            proposal_id: proposal.id.clone(),
            assignment_ids: created.iter().map(|a| a.id.clone()).collect(),
        };
        let change = apply_event(&mut *tx, &event, &now).await?;
        tx.commit().await?;

        info!(
            proposal_id = %proposal.id,
            assigned_by = %assigner.username,
            count = created.len(),
            "Reviewers assigned"
        );

        let mut outbox: Vec<_> = created
            .iter()
            .map(|a| notifications::reviewer_assigned(a, &proposal))
            .collect();
        if let Some(change) = change {
            outbox.push(notifications::status_changed(&change.proposal, change.from, change.to));
        }
        notifications::dispatch(self.notifier.as_ref(), outbox).await;

        Ok(created)
    }

    pub async fn find(&self, assignment_id: &str) -> ReviewResult<Assignment> {
        Assignment::find_by_id(&self.db, assignment_id)
            .await?
            .ok_or_else(|| ReviewError::not_found("assignment", assignment_id))
    }

    /// Move an assignment to any status. COMPLETED stamps the completion date;
    /// leaving COMPLETED keeps the old date.
    pub async fn update_status(
        &self,
        assignment_id: &str,
        status: AssignmentStatus,
        actor: &Principal,
    ) -> ReviewResult<Assignment> {
        let mut tx = db::begin_write(&self.db).await?;

        let mut assignment = Assignment::find_by_id(&mut *tx, assignment_id)
            .await?
            .ok_or_else(|| ReviewError::not_found("assignment", assignment_id))?;
        if actor.is(Role::Reviewer) && assignment.reviewer_id != actor.user_id {
            return Err(ReviewError::forbidden(
                "Reviewers may only update their own assignments",
            ));
        }

        let previous = assignment.status();
        if status == AssignmentStatus::Completed {
            assignment.completed_date = Some(format_timestamp(self.clock.now()));
        }
        Assignment::set_status(
            &mut *tx,
            assignment_id,
            status,
            assignment.completed_date.as_deref(),
        )
        .await?;
        tx.commit().await?;

        info!(
            assignment_id = %assignment_id,
            actor = %actor.username,
            "Assignment status {} -> {}",
            previous,
            status
        );

        assignment.status = status.to_string();
        Ok(assignment)
    }

    pub async fn is_assigned(&self, proposal_id: &str, reviewer_id: &str) -> ReviewResult<bool> {
        Ok(Assignment::exists_for_pair(&self.db, proposal_id, reviewer_id).await?)
    }

    /// Unfinished assignments past their due date. Their stored status is left as is.
    pub async fn overdue(&self) -> ReviewResult<Vec<Assignment>> {
        let now = format_timestamp(self.clock.now());
        Ok(Assignment::list_overdue(&self.db, &now).await?)
    }

    pub async fn remove(&self, assignment_id: &str, requester_id: &str) -> ReviewResult<()> {
        let requester = User::find_by_id(&self.db, requester_id)
            .await?
            .ok_or_else(|| ReviewError::not_found("user", requester_id))?;
        if !requester.role().can_manage_assignments() {
            return Err(ReviewError::forbidden(
                "Only committee chairs and administrators can remove assignments",
            ));
        }

        if !Assignment::delete(&self.db, assignment_id).await? {
            return Err(ReviewError::not_found("assignment", assignment_id));
        }

        info!(
            assignment_id = %assignment_id,
            removed_by = %requester.username,
            "Assignment removed"
        );
        Ok(())
    }

    pub async fn for_proposal(&self, proposal_id: &str) -> ReviewResult<Vec<Assignment>> {
        Ok(Assignment::list_for_proposal(&self.db, proposal_id).await?)
    }

    pub async fn for_reviewer(&self, reviewer_id: &str) -> ReviewResult<Vec<Assignment>> {
        Ok(Assignment::list_for_reviewer(&self.db, reviewer_id, &[]).await?)
    }

    /// Assignments the reviewer has not finished: PENDING or IN_PROGRESS
    pub async fn pending_for_reviewer(&self, reviewer_id: &str) -> ReviewResult<Vec<Assignment>> {
        Ok(Assignment::list_for_reviewer(
            &self.db,
            reviewer_id,
            &[AssignmentStatus::Pending, AssignmentStatus::InProgress],
        )
        .await?)
    }

    pub async fn completed_for_reviewer(
        &self,
        reviewer_id: &str,
    ) -> ReviewResult<Vec<Assignment>> {
        Ok(
            Assignment::list_for_reviewer(&self.db, reviewer_id, &[AssignmentStatus::Completed])
                .await?,
        )
    }

    pub async fn assigned_proposal_ids(&self, reviewer_id: &str) -> ReviewResult<Vec<String>> {
        Ok(Assignment::proposal_ids_for_reviewer(&self.db, reviewer_id).await?)
    }

    pub async fn statistics(&self, reviewer_id: &str) -> ReviewResult<AssignmentStatistics> {
        Ok(Assignment::statistics_for_reviewer(&self.db, reviewer_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ProposalStatus;
    use crate::testing::{self, FailingNotifier, RecordingNotifier};
    use chrono::Duration;

    struct Fixture {
        db: DbPool,
        clock: Arc<crate::clock::ManualClock>,
        notifier: Arc<RecordingNotifier>,
        manager: ReviewerAssignmentManager,
        pi: User,
        chair: User,
        reviewer: User,
    }

    async fn fixture() -> Fixture {
        let db = testing::memory_pool().await;
        let clock = testing::manual_clock();
        let notifier = Arc::new(RecordingNotifier::default());
        let manager = ReviewerAssignmentManager::new(db.clone(), clock.clone(), notifier.clone());
        let pi = testing::seed_user(&db, "pia", Role::PrincipalInvestigator).await;
        let chair = testing::seed_user(&db, "chair", Role::CommitteeChair).await;
        let reviewer = testing::seed_user(&db, "rev", Role::Reviewer).await;
        Fixture {
            db,
            clock,
            notifier,
            manager,
            pi,
            chair,
            reviewer,
        }
    }

    fn request(proposal: &Proposal, reviewers: &[&User], assigner: &User) -> AssignmentRequest {
        AssignmentRequest {
            proposal_id: proposal.id.clone(),
            reviewer_ids: reviewers.iter().map(|u| u.id.clone()).collect(),
            assigner_id: assigner.id.clone(),
            due_date: None,
            notes: None,
        }
    }

    async fn status_of(db: &DbPool, proposal: &Proposal) -> ProposalStatus {
        Proposal::find_by_id(db, &proposal.id)
            .await
            .unwrap()
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn test_assigning_moves_submitted_to_under_review() {
        let f = fixture().await;
        let proposal = testing::seed_proposal(&f.db, &f.pi, ProposalStatus::Submitted).await;

        let created = f
            .manager
            .assign(request(&proposal, &[&f.reviewer], &f.chair))
            .await
            .unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].status(), AssignmentStatus::Pending);
        assert_eq!(created[0].assigned_by_id, f.chair.id);
        assert_eq!(status_of(&f.db, &proposal).await, ProposalStatus::UnderReview);

        // Reviewer is told about the assignment, the investigator about the status change
        let sent = f.notifier.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].user_id, f.reviewer.id);
        assert_eq!(sent[1].user_id, f.pi.id);

        // A second reviewer while already under review leaves the status alone
        let second = testing::seed_user(&f.db, "rev2", Role::Reviewer).await;
        f.manager
            .assign(request(&proposal, &[&second], &f.chair))
            .await
            .unwrap();
        assert_eq!(status_of(&f.db, &proposal).await, ProposalStatus::UnderReview);
        assert_eq!(f.notifier.sent().len(), 3);
    }

    #[tokio::test]
    async fn test_draft_proposal_cannot_take_reviewers() {
        let f = fixture().await;
        let proposal = testing::seed_proposal(&f.db, &f.pi, ProposalStatus::Draft).await;

        let err = f
            .manager
            .assign(request(&proposal, &[&f.reviewer], &f.chair))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ReviewError::InvalidState { ref current, .. } if current == "DRAFT"
        ));
        assert!(f.manager.for_proposal(&proposal.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_same_reviewer_twice_is_duplicate() {
        let f = fixture().await;
        let proposal = testing::seed_proposal(&f.db, &f.pi, ProposalStatus::Submitted).await;

        f.manager
            .assign(request(&proposal, &[&f.reviewer], &f.chair))
            .await
            .unwrap();
        let err = f
            .manager
            .assign(request(&proposal, &[&f.reviewer], &f.chair))
            .await
            .unwrap_err();
        assert!(matches!(err, ReviewError::DuplicateAssignment { .. }));
        assert_eq!(f.manager.for_proposal(&proposal.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_batch_is_all_or_nothing() {
        let f = fixture().await;
        let proposal = testing::seed_proposal(&f.db, &f.pi, ProposalStatus::Submitted).await;
        let not_a_reviewer = testing::seed_user(&f.db, "stake", Role::Stakeholder).await;

        let err = f
            .manager
            .assign(request(&proposal, &[&f.reviewer, &not_a_reviewer], &f.chair))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ReviewError::InvalidRole { actual: Role::Stakeholder, .. }
        ));

        assert!(f.manager.for_proposal(&proposal.id).await.unwrap().is_empty());
        assert_eq!(status_of(&f.db, &proposal).await, ProposalStatus::Submitted);
        assert!(f.notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_precondition_order() {
        let f = fixture().await;
        let proposal = testing::seed_proposal(&f.db, &f.pi, ProposalStatus::Submitted).await;

        let missing = AssignmentRequest {
            proposal_id: "missing".to_string(),
            ..request(&proposal, &[&f.reviewer], &f.chair)
        };
        assert!(matches!(
            f.manager.assign(missing).await,
            Err(ReviewError::NotFound { entity: "proposal", .. })
        ));

        let err = f
            .manager
            .assign(request(&proposal, &[&f.reviewer], &f.pi))
            .await
            .unwrap_err();
        assert!(matches!(err, ReviewError::Forbidden(_)));

        let mut ghost = request(&proposal, &[], &f.chair);
        ghost.reviewer_ids = vec!["ghost".to_string()];
        assert!(matches!(
            f.manager.assign(ghost).await,
            Err(ReviewError::NotFound { entity: "reviewer", .. })
        ));
    }

    #[tokio::test]
    async fn test_notification_failure_keeps_assignment() {
        let f = fixture().await;
        let manager =
            ReviewerAssignmentManager::new(f.db.clone(), f.clock.clone(), Arc::new(FailingNotifier));
        let proposal = testing::seed_proposal(&f.db, &f.pi, ProposalStatus::Submitted).await;

        let created = manager
            .assign(request(&proposal, &[&f.reviewer], &f.chair))
            .await
            .unwrap();
        assert_eq!(created.len(), 1);
        assert!(manager.is_assigned(&proposal.id, &f.reviewer.id).await.unwrap());
        assert_eq!(status_of(&f.db, &proposal).await, ProposalStatus::UnderReview);
    }

    #[tokio::test]
    async fn test_status_updates_are_free() {
        let f = fixture().await;
        let proposal = testing::seed_proposal(&f.db, &f.pi, ProposalStatus::Submitted).await;
        let created = f
            .manager
            .assign(request(&proposal, &[&f.reviewer], &f.chair))
            .await
            .unwrap();
        let id = &created[0].id;
        let actor = testing::principal(&f.reviewer);

        let done = f
            .manager
            .update_status(id, AssignmentStatus::Completed, &actor)
            .await
            .unwrap();
        assert_eq!(done.status(), AssignmentStatus::Completed);
        let completed_at = done.completed_date.clone().unwrap();

        let reopened = f
            .manager
            .update_status(id, AssignmentStatus::Pending, &actor)
            .await
            .unwrap();
        assert_eq!(reopened.status(), AssignmentStatus::Pending);
        assert_eq!(reopened.completed_date, Some(completed_at));

        let stranger = testing::seed_user(&f.db, "rev2", Role::Reviewer).await;
        assert!(matches!(
            f.manager
                .update_status(id, AssignmentStatus::InProgress, &testing::principal(&stranger))
                .await,
            Err(ReviewError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_overdue_is_derived() {
        let f = fixture().await;
        let proposal = testing::seed_proposal(&f.db, &f.pi, ProposalStatus::Submitted).await;
        let second = testing::seed_user(&f.db, "rev2", Role::Reviewer).await;

        let mut req = request(&proposal, &[&f.reviewer, &second], &f.chair);
        req.due_date = Some(f.clock.now() + Duration::days(14));
        let created = f.manager.assign(req).await.unwrap();

        assert!(f.manager.overdue().await.unwrap().is_empty());

        f.clock.advance(Duration::days(15));
        f.manager
            .update_status(&created[1].id, AssignmentStatus::Completed, &testing::principal(&second))
            .await
            .unwrap();

        let overdue = f.manager.overdue().await.unwrap();
        assert_eq!(overdue.len(), 1);
        assert_eq!(overdue[0].reviewer_id, f.reviewer.id);
        // Derived only: the stored status is untouched
        assert_eq!(overdue[0].status(), AssignmentStatus::Pending);
    }

    #[tokio::test]
    async fn test_reviewer_views_and_statistics() {
        let f = fixture().await;
        let first = testing::seed_proposal(&f.db, &f.pi, ProposalStatus::Submitted).await;
        let second = testing::seed_proposal(&f.db, &f.pi, ProposalStatus::Submitted).await;
        let a = f
            .manager
            .assign(request(&first, &[&f.reviewer], &f.chair))
            .await
            .unwrap();
        f.manager
            .assign(request(&second, &[&f.reviewer], &f.chair))
            .await
            .unwrap();
        f.manager
            .update_status(&a[0].id, AssignmentStatus::Completed, &testing::principal(&f.chair))
            .await
            .unwrap();

        assert_eq!(f.manager.for_reviewer(&f.reviewer.id).await.unwrap().len(), 2);
        let pending = f.manager.pending_for_reviewer(&f.reviewer.id).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].proposal_id, second.id);
        let completed = f.manager.completed_for_reviewer(&f.reviewer.id).await.unwrap();
        assert_eq!(completed.len(), 1);

        let mut ids = f.manager.assigned_proposal_ids(&f.reviewer.id).await.unwrap();
        ids.sort();
        let mut expected = vec![first.id.clone(), second.id.clone()];
        expected.sort();
        assert_eq!(ids, expected);

        assert_eq!(
            f.manager.statistics(&f.reviewer.id).await.unwrap(),
            AssignmentStatistics {
                total: 2,
                pending: 1,
                in_progress: 0,
                completed: 1,
            }
        );
        assert_eq!(
            f.manager.statistics(&f.chair.id).await.unwrap(),
            AssignmentStatistics::default()
        );
    }

    #[tokio::test]
    async fn test_remove_requires_assigner_role() {
        let f = fixture().await;
        let proposal = testing::seed_proposal(&f.db, &f.pi, ProposalStatus::Submitted).await;
        let created = f
            .manager
            .assign(request(&proposal, &[&f.reviewer], &f.chair))
            .await
            .unwrap();

        assert!(matches!(
            f.manager.remove(&created[0].id, &f.reviewer.id).await,
            Err(ReviewError::Forbidden(_))
        ));
        f.manager.remove(&created[0].id, &f.chair.id).await.unwrap();
        assert!(!f.manager.is_assigned(&proposal.id, &f.reviewer.id).await.unwrap());
        assert!(matches!(
            f.manager.remove(&created[0].id, &f.chair.id).await,
            Err(ReviewError::NotFound { .. })
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_assignments_of_same_pair_conflict() {
        let scratch = testing::scratch_db().await;
        let db = scratch.pool.clone();
        let manager = Arc::new(ReviewerAssignmentManager::new(
            db.clone(),
            testing::manual_clock(),
            Arc::new(RecordingNotifier::default()),
        ));
        let pi = testing::seed_user(&db, "pia", Role::PrincipalInvestigator).await;
        let chair = testing::seed_user(&db, "chair", Role::CommitteeChair).await;
        let reviewer = testing::seed_user(&db, "rev", Role::Reviewer).await;

        for round in 0..10 {
            let proposal = testing::seed_proposal(&db, &pi, ProposalStatus::Submitted).await;
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    let manager = manager.clone();
                    let req = request(&proposal, &[&reviewer], &chair);
                    tokio::spawn(async move { manager.assign(req).await })
                })
                .collect();

            let mut created = 0;
            let mut duplicates = 0;
            for handle in handles {
                match handle.await.unwrap() {
                    Ok(_) => created += 1,
                    Err(ReviewError::DuplicateAssignment { .. }) => duplicates += 1,
                    Err(e) => panic!("round {}: unexpected error {}", round, e),
                }
            }
            assert_eq!((created, duplicates), (1, 1), "round {}", round);
            assert_eq!(manager.for_proposal(&proposal.id).await.unwrap().len(), 1);
        }
    }
}
