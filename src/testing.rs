//! Fixtures shared by the unit tests.

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;

use crate::auth::{Principal, TokenCodec};
use crate::clock::{format_timestamp, Clock, ManualClock};
use crate::db::{
    self, Assignment, AssignmentStatus, DbPool, NewNotification, NewProposal, NewUser, Proposal,
    ProposalStatus, Role, User,
};
use crate::notifications::Notifier;

pub const TEST_SECRET: &[u8] = b"test-secret-that-is-long-enough-for-hs256";

pub async fn memory_pool() -> DbPool {
    db::init_in_memory().await.unwrap()
}

/// A file-backed database in a scratch directory, removed on drop.
///
/// Unlike [`memory_pool`] it allows several connections, so writers can race.
pub struct ScratchDb {
    pub pool: DbPool,
    dir: PathBuf,
}

impl Drop for ScratchDb {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

pub async fn scratch_db() -> ScratchDb {
    let dir = std::env::temp_dir().join(format!("reviewdesk-test-{}", uuid::Uuid::new_v4()));
    let pool = db::init(&dir).await.unwrap();
    ScratchDb { pool, dir }
}

pub fn manual_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap(),
    ))
}

pub fn token_codec(clock: Arc<ManualClock>) -> TokenCodec {
    TokenCodec::new(TEST_SECRET, Duration::hours(24), Duration::days(7), clock)
}

/// Insert an active user. The password hash is a placeholder that never verifies.
pub async fn seed_user(db: &DbPool, username: &str, role: Role) -> User {
    let new = NewUser {
        username: username.to_string(),
        email: format!("{}@example.org", username),
        password_hash: "not-a-real-hash".to_string(),
        first_name: None,
        last_name: None,
        role,
        department_id: None,
    };
    User::create(db, &new, "2026-03-01T00:00:00Z").await.unwrap()
}

pub fn principal(user: &User) -> Principal {
    Principal {
        user_id: user.id.clone(),
        username: user.username.clone(),
        role: user.role(),
    }
}

/// Insert a proposal owned by `pi` and force it into `status`
pub async fn seed_proposal(db: &DbPool, pi: &User, status: ProposalStatus) -> Proposal {
    let new = NewProposal {
        title: format!("Proposal by {}", pi.username),
        abstract_text: Some("Fixture".to_string()),
        principal_investigator_id: pi.id.clone(),
        department_id: "research".to_string(),
        created_by: pi.id.clone(),
        requested_amount: Some(10_000.0),
    };
    let mut proposal = Proposal::create(db, &new, "2026-03-01T00:00:00Z")
        .await
        .unwrap();
    if status != ProposalStatus::Draft {
        Proposal::set_status(db, &proposal.id, status, "2026-03-01T00:00:00Z")
            .await
            .unwrap();
        proposal.status = status.to_string();
    }
    proposal
}

/// Insert an assignment row directly, bypassing the manager's checks
pub async fn seed_assignment(
    db: &DbPool,
    proposal: &Proposal,
    reviewer: &User,
    assigner: &User,
    status: AssignmentStatus,
) -> Assignment {
    let assignment = Assignment {
        id: uuid::Uuid::new_v4().to_string(),
        proposal_id: proposal.id.clone(),
        reviewer_id: reviewer.id.clone(),
        assigned_by_id: assigner.id.clone(),
        assigned_date: format_timestamp(manual_clock().now()),
        due_date: None,
        status: status.to_string(),
        notes: None,
        completed_date: None,
    };
    Assignment::insert(db, &assignment).await.unwrap();
    assignment
}

/// Keeps every notification it is handed
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<NewNotification>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<NewNotification> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: &NewNotification) -> anyhow::Result<()> {
        self.sent.lock().push(notification.clone());
        Ok(())
    }
}

/// Refuses every delivery
pub struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    async fn notify(&self, _notification: &NewNotification) -> anyhow::Result<()> {
        anyhow::bail!("notification channel unavailable")
    }
}
