//! Reviewer assignments (the proposal_reviewers table).

use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssignmentStatus {
    Pending,
    InProgress,
    Completed,
    /// Never written by the service itself; overdue work is derived from due dates
    Overdue,
}

impl AssignmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentStatus::Pending => "PENDING",
            AssignmentStatus::InProgress => "IN_PROGRESS",
            AssignmentStatus::Completed => "COMPLETED",
            AssignmentStatus::Overdue => "OVERDUE",
        }
    }
}

impl std::fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AssignmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "PENDING" => Ok(AssignmentStatus::Pending),
            "IN_PROGRESS" => Ok(AssignmentStatus::InProgress),
            "COMPLETED" => Ok(AssignmentStatus::Completed),
            "OVERDUE" => Ok(AssignmentStatus::Overdue),
            _ => Err(format!("Unknown assignment status: {}", s)),
        }
    }
}

impl From<String> for AssignmentStatus {
    fn from(s: String) -> Self {
        s.parse().unwrap_or(AssignmentStatus::Pending)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Assignment {
    pub id: String,
    pub proposal_id: String,
    pub reviewer_id: String,
    pub assigned_by_id: String,
    pub assigned_date: String,
    pub due_date: Option<String>,
    pub status: String,
    pub notes: Option<String>,
    pub completed_date: Option<String>,
}

impl Assignment {
    pub fn status(&self) -> AssignmentStatus {
        AssignmentStatus::from(self.status.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentResponse {
    pub id: String,
    pub proposal_id: String,
    pub reviewer_id: String,
    pub assigned_by_id: String,
    pub assigned_date: String,
    pub due_date: Option<String>,
    pub status: AssignmentStatus,
    pub notes: Option<String>,
    pub completed_date: Option<String>,
}

impl From<Assignment> for AssignmentResponse {
    fn from(a: Assignment) -> Self {
        Self {
            status: a.status(),
            id: a.id,
            proposal_id: a.proposal_id,
            reviewer_id: a.reviewer_id,
            assigned_by_id: a.assigned_by_id,
            assigned_date: a.assigned_date,
            due_date: a.due_date,
            notes: a.notes,
            completed_date: a.completed_date,
        }
    }
}

/// Per-reviewer workload counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct AssignmentStatistics {
    pub total: i64,
    pub pending: i64,
    pub in_progress: i64,
    pub completed: i64,
}

const ASSIGNMENT_COLUMNS: &str = "id, proposal_id, reviewer_id, assigned_by_id, assigned_date, \
    due_date, status, notes, completed_date";

impl Assignment {
    pub async fn insert<'e, E>(db: E, assignment: &Assignment) -> Result<(), sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            r#"
            INSERT INTO proposal_reviewers (id, proposal_id, reviewer_id, assigned_by_id, assigned_date, due_date, status, notes, completed_date)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&assignment.id)
        .bind(&assignment.proposal_id)
        .bind(&assignment.reviewer_id)
        .bind(&assignment.assigned_by_id)
        .bind(&assignment.assigned_date)
        .bind(&assignment.due_date)
        .bind(&assignment.status)
        .bind(&assignment.notes)
        .bind(&assignment.completed_date)
        .execute(db)
        .await?;
        Ok(())
    }

    pub async fn find_by_id<'e, E>(db: E, id: &str) -> Result<Option<Assignment>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as(&format!(
            "SELECT {} FROM proposal_reviewers WHERE id = ?",
            ASSIGNMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(db)
        .await
    }

    pub async fn find_for_pair<'e, E>(
        db: E,
        proposal_id: &str,
        reviewer_id: &str,
    ) -> Result<Option<Assignment>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as(&format!(
            "SELECT {} FROM proposal_reviewers WHERE proposal_id = ? AND reviewer_id = ?",
            ASSIGNMENT_COLUMNS
        ))
        .bind(proposal_id)
        .bind(reviewer_id)
        .fetch_optional(db)
        .await
    }

    pub async fn list_for_proposal<'e, E>(
        db: E,
        proposal_id: &str,
    ) -> Result<Vec<Assignment>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as(&format!(
            "SELECT {} FROM proposal_reviewers WHERE proposal_id = ? ORDER BY assigned_date ASC",
            ASSIGNMENT_COLUMNS
        ))
        .bind(proposal_id)
        .fetch_all(db)
        .await
    }

    /// Assignments held by a reviewer, optionally restricted to a set of statuses
    pub async fn list_for_reviewer<'e, E>(
        db: E,
        reviewer_id: &str,
        statuses: &[AssignmentStatus],
    ) -> Result<Vec<Assignment>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let mut sql = format!(
            "SELECT {} FROM proposal_reviewers WHERE reviewer_id = ?",
            ASSIGNMENT_COLUMNS
        );
        if !statuses.is_empty() {
            let placeholders = vec!["?"; statuses.len()].join(", ");
            sql.push_str(&format!(" AND status IN ({})", placeholders));
        }
        sql.push_str(" ORDER BY assigned_date DESC");

        let mut query = sqlx::query_as::<_, Assignment>(&sql).bind(reviewer_id);
        for status in statuses {
            query = query.bind(status.as_str());
        }
        let rows = query.fetch_all(db).await?;
        Ok(rows)
    }

    /// Assignments whose due date is before `now` and which are not completed
    pub async fn list_overdue<'e, E>(db: E, now: &str) -> Result<Vec<Assignment>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as(&format!(
            "SELECT {} FROM proposal_reviewers \
             WHERE due_date IS NOT NULL AND due_date < ? AND status != 'COMPLETED' \
             ORDER BY due_date ASC",
            ASSIGNMENT_COLUMNS
        ))
        .bind(now)
        .fetch_all(db)
        .await
    }

    pub async fn proposal_ids_for_reviewer<'e, E>(
        db: E,
        reviewer_id: &str,
    ) -> Result<Vec<String>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT proposal_id FROM proposal_reviewers WHERE reviewer_id = ? ORDER BY assigned_date DESC",
        )
        .bind(reviewer_id)
        .fetch_all(db)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    pub async fn exists_for_pair<'e, E>(
        db: E,
        proposal_id: &str,
        reviewer_id: &str,
    ) -> Result<bool, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM proposal_reviewers WHERE proposal_id = ? AND reviewer_id = ?",
        )
        .bind(proposal_id)
        .bind(reviewer_id)
        .fetch_one(db)
        .await?;
        Ok(count.0 > 0)
    }

    pub async fn statistics_for_reviewer<'e, E>(
        db: E,
        reviewer_id: &str,
    ) -> Result<AssignmentStatistics, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as(
            r#"
            SELECT
                COUNT(*) AS total,
                COALESCE(SUM(CASE WHEN status = 'PENDING' THEN 1 ELSE 0 END), 0) AS pending,
                COALESCE(SUM(CASE WHEN status = 'IN_PROGRESS' THEN 1 ELSE 0 END), 0) AS in_progress,
                COALESCE(SUM(CASE WHEN status = 'COMPLETED' THEN 1 ELSE 0 END), 0) AS completed
            FROM proposal_reviewers
            WHERE reviewer_id = ?
            "#,
        )
        .bind(reviewer_id)
        .fetch_one(db)
        .await
    }

    pub async fn set_status<'e, E>(
        db: E,
        id: &str,
        status: AssignmentStatus,
        completed_date: Option<&str>,
    ) -> Result<(), sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query("UPDATE proposal_reviewers SET status = ?, completed_date = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(completed_date)
            .bind(id)
            .execute(db)
            .await?;
        Ok(())
    }

    pub async fn delete<'e, E>(db: E, id: &str) -> Result<bool, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query("DELETE FROM proposal_reviewers WHERE id = ?")
            .bind(id)
            .execute(db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_for_proposal<'e, E>(db: E, proposal_id: &str) -> Result<u64, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query("DELETE FROM proposal_reviewers WHERE proposal_id = ?")
            .bind(proposal_id)
            .execute(db)
            .await?;
        Ok(result.rows_affected())
    }
}
