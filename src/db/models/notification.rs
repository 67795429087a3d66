//! In-app notifications addressed to a single user.

use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite};

/// What happened, from the recipient's point of view
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    ReviewerAssigned,
    ProposalStatusChanged,
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ReviewerAssigned => write!(f, "reviewer_assigned"),
            Self::ProposalStatusChanged => write!(f, "proposal_status_changed"),
        }
    }
}

impl std::str::FromStr for NotificationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "reviewer_assigned" => Ok(Self::ReviewerAssigned),
            "proposal_status_changed" => Ok(Self::ProposalStatusChanged),
            _ => Err(format!("Unknown notification kind: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub related_proposal_id: Option<String>,
    pub is_read: i32,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationResponse {
    pub id: String,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub related_proposal_id: Option<String>,
    pub is_read: bool,
    pub created_at: String,
}

impl From<Notification> for NotificationResponse {
    fn from(n: Notification) -> Self {
        Self {
            id: n.id,
            kind: n.kind,
            title: n.title,
            message: n.message,
            related_proposal_id: n.related_proposal_id,
            is_read: n.is_read != 0,
            created_at: n.created_at,
        }
    }
}

/// A notification waiting to be delivered
#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub user_id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub related_proposal_id: Option<String>,
}

impl Notification {
    pub async fn create<'e, E>(
        db: E,
        new: &NewNotification,
        now: &str,
    ) -> Result<Notification, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let notification = Notification {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: new.user_id.clone(),
            kind: new.kind.to_string(),
            title: new.title.clone(),
            message: new.message.clone(),
            related_proposal_id: new.related_proposal_id.clone(),
            is_read: 0,
            created_at: now.to_string(),
        };

        sqlx::query(
            r#"
            INSERT INTO notifications (id, user_id, kind, title, message, related_proposal_id, is_read, created_at)
            VALUES (?, ?, ?, ?, ?, ?, 0, ?)
            "#,
        )
        .bind(&notification.id)
        .bind(&notification.user_id)
        .bind(&notification.kind)
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(&notification.related_proposal_id)
        .bind(&notification.created_at)
        .execute(db)
        .await?;

        Ok(notification)
    }

    pub async fn list_for_user<'e, E>(
        db: E,
        user_id: &str,
        unread_only: bool,
    ) -> Result<Vec<Notification>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as(
            r#"
            SELECT id, user_id, kind, title, message, related_proposal_id, is_read, created_at
            FROM notifications
            WHERE user_id = ? AND (? = 0 OR is_read = 0)
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .bind(unread_only as i32)
        .fetch_all(db)
        .await
    }

    /// Mark one of the user's notifications read. False if it isn't theirs or doesn't exist.
    pub async fn mark_read<'e, E>(db: E, id: &str, user_id: &str) -> Result<bool, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query("UPDATE notifications SET is_read = 1 WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_for_proposal<'e, E>(db: E, proposal_id: &str) -> Result<u64, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query("DELETE FROM notifications WHERE related_proposal_id = ?")
            .bind(proposal_id)
            .execute(db)
            .await?;
        Ok(result.rows_affected())
    }
}
