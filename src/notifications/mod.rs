//! Best-effort notifications for reviewers and principal investigators.
//!
//! Delivery happens after the triggering transaction has committed. A failed
//! delivery is logged and dropped; it never undoes or fails the state change
//! that caused it.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::clock::{format_timestamp, Clock};
use crate::db::{Assignment, NewNotification, Notification, NotificationKind, Proposal, ProposalStatus};
use crate::DbPool;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &NewNotification) -> Result<()>;
}

/// Stores notifications in the database for the recipient to read in-app
pub struct DbNotifier {
    db: DbPool,
    clock: Arc<dyn Clock>,
}

impl DbNotifier {
    pub fn new(db: DbPool, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }
}

#[async_trait]
impl Notifier for DbNotifier {
    async fn notify(&self, notification: &NewNotification) -> Result<()> {
        let stored =
            Notification::create(&self.db, notification, &format_timestamp(self.clock.now()))
                .await?;
        tracing::debug!(
            notification_id = %stored.id,
            user_id = %stored.user_id,
            kind = %stored.kind,
            "Notification stored"
        );
        Ok(())
    }
}

/// Deliver each notification, logging and swallowing failures
pub async fn dispatch(notifier: &dyn Notifier, batch: Vec<NewNotification>) {
    for notification in batch {
        if let Err(e) = notifier.notify(&notification).await {
            tracing::warn!(
                user_id = %notification.user_id,
                kind = %notification.kind,
                error = %e,
                "Failed to deliver notification"
            );
        }
    }
}

pub fn reviewer_assigned(assignment: &Assignment, proposal: &Proposal) -> NewNotification {
    let message = match &assignment.due_date {
        Some(due) => format!(
            "You have been assigned to review \"{}\". The review is due {}.",
            proposal.title, due
        ),
        None => format!("You have been assigned to review \"{}\".", proposal.title),
    };
    NewNotification {
        user_id: assignment.reviewer_id.clone(),
        kind: NotificationKind::ReviewerAssigned,
        title: "New review assignment".to_string(),
        message,
        related_proposal_id: Some(proposal.id.clone()),
    }
}

pub fn status_changed(
    proposal: &Proposal,
    from: ProposalStatus,
    to: ProposalStatus,
) -> NewNotification {
    NewNotification {
        user_id: proposal.principal_investigator_id.clone(),
        kind: NotificationKind::ProposalStatusChanged,
        title: format!("Proposal {}", to.as_str().to_lowercase().replace('_', " ")),
        message: format!(
            "The status of \"{}\" changed from {} to {}.",
            proposal.title, from, to
        ),
        related_proposal_id: Some(proposal.id.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Role;
    use crate::testing::{self, FailingNotifier, RecordingNotifier};

    #[tokio::test]
    async fn test_db_notifier_stores_for_recipient() {
        let db = testing::memory_pool().await;
        let clock = testing::manual_clock();
        let pi = testing::seed_user(&db, "pia", Role::PrincipalInvestigator).await;
        let proposal = testing::seed_proposal(&db, &pi, ProposalStatus::Submitted).await;

        let notifier = DbNotifier::new(db.clone(), clock);
        notifier
            .notify(&status_changed(
                &proposal,
                ProposalStatus::Submitted,
                ProposalStatus::UnderReview,
            ))
            .await
            .unwrap();

        let stored = Notification::list_for_user(&db, &pi.id, true).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].kind, "proposal_status_changed");
        assert_eq!(stored[0].title, "Proposal under review");
        assert_eq!(stored[0].related_proposal_id.as_deref(), Some(proposal.id.as_str()));

        assert!(Notification::mark_read(&db, &stored[0].id, &pi.id).await.unwrap());
        assert!(Notification::list_for_user(&db, &pi.id, true).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_swallows_failures() {
        let failing = FailingNotifier;
        let note = NewNotification {
            user_id: "u".to_string(),
            kind: NotificationKind::ReviewerAssigned,
            title: "t".to_string(),
            message: "m".to_string(),
            related_proposal_id: None,
        };
        dispatch(&failing, vec![note.clone(), note.clone()]).await;

        let recording = RecordingNotifier::default();
        dispatch(&recording, vec![note.clone()]).await;
        assert_eq!(recording.sent(), vec![note]);
    }
}
