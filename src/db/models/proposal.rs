//! Research proposals and their status column.

use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProposalStatus {
    Draft,
    Submitted,
    UnderReview,
    Approved,
    Rejected,
    Withdrawn,
}

impl ProposalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalStatus::Draft => "DRAFT",
            ProposalStatus::Submitted => "SUBMITTED",
            ProposalStatus::UnderReview => "UNDER_REVIEW",
            ProposalStatus::Approved => "APPROVED",
            ProposalStatus::Rejected => "REJECTED",
            ProposalStatus::Withdrawn => "WITHDRAWN",
        }
    }

    /// A decision has been reached; no further review transitions apply
    pub fn is_decided(&self) -> bool {
        matches!(self, ProposalStatus::Approved | ProposalStatus::Rejected)
    }

    pub fn is_terminal(&self) -> bool {
        self.is_decided() || *self == ProposalStatus::Withdrawn
    }

    /// Statuses in which reviewers may be assigned
    pub fn accepts_reviewers(&self) -> bool {
        matches!(self, ProposalStatus::Submitted | ProposalStatus::UnderReview)
    }
}

impl std::fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProposalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "DRAFT" => Ok(ProposalStatus::Draft),
            "SUBMITTED" => Ok(ProposalStatus::Submitted),
            "UNDER_REVIEW" => Ok(ProposalStatus::UnderReview),
            "APPROVED" => Ok(ProposalStatus::Approved),
            "REJECTED" => Ok(ProposalStatus::Rejected),
            "WITHDRAWN" => Ok(ProposalStatus::Withdrawn),
            _ => Err(format!("Unknown proposal status: {}", s)),
        }
    }
}

impl From<String> for ProposalStatus {
    fn from(s: String) -> Self {
        s.parse().unwrap_or(ProposalStatus::Draft)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Proposal {
    pub id: String,
    pub title: String,
    pub abstract_text: Option<String>,
    pub principal_investigator_id: String,
    pub department_id: String,
    pub created_by: String,
    pub requested_amount: Option<f64>,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Proposal {
    pub fn status(&self) -> ProposalStatus {
        ProposalStatus::from(self.status.clone())
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.principal_investigator_id == user_id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalResponse {
    pub id: String,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub principal_investigator_id: String,
    pub department_id: String,
    pub created_by: String,
    pub requested_amount: Option<f64>,
    pub status: ProposalStatus,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Proposal> for ProposalResponse {
    fn from(p: Proposal) -> Self {
        Self {
            status: p.status(),
            id: p.id,
            title: p.title,
            abstract_text: p.abstract_text,
            principal_investigator_id: p.principal_investigator_id,
            department_id: p.department_id,
            created_by: p.created_by,
            requested_amount: p.requested_amount,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewProposal {
    pub title: String,
    pub abstract_text: Option<String>,
    pub principal_investigator_id: String,
    pub department_id: String,
    pub created_by: String,
    pub requested_amount: Option<f64>,
}

const PROPOSAL_COLUMNS: &str = "id, title, abstract_text, principal_investigator_id, \
    department_id, created_by, requested_amount, status, created_at, updated_at";

impl Proposal {
    /// Insert a proposal in DRAFT
    pub async fn create<'e, E>(db: E, new: &NewProposal, now: &str) -> Result<Proposal, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let proposal = Proposal {
            id: uuid::Uuid::new_v4().to_string(),
            title: new.title.clone(),
            abstract_text: new.abstract_text.clone(),
            principal_investigator_id: new.principal_investigator_id.clone(),
            department_id: new.department_id.clone(),
            created_by: new.created_by.clone(),
            requested_amount: new.requested_amount,
            status: ProposalStatus::Draft.to_string(),
            created_at: now.to_string(),
            updated_at: now.to_string(),
        };

        sqlx::query(
            r#"
            INSERT INTO proposals (id, title, abstract_text, principal_investigator_id, department_id, created_by, requested_amount, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&proposal.id)
        .bind(&proposal.title)
        .bind(&proposal.abstract_text)
        .bind(&proposal.principal_investigator_id)
        .bind(&proposal.department_id)
        .bind(&proposal.created_by)
        .bind(proposal.requested_amount)
        .bind(&proposal.status)
        .bind(&proposal.created_at)
        .bind(&proposal.updated_at)
        .execute(db)
        .await?;

        Ok(proposal)
    }

    pub async fn find_by_id<'e, E>(db: E, id: &str) -> Result<Option<Proposal>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as(&format!(
            "SELECT {} FROM proposals WHERE id = ?",
            PROPOSAL_COLUMNS
        ))
        .bind(id)
        .fetch_optional(db)
        .await
    }

    pub async fn list<'e, E>(db: E) -> Result<Vec<Proposal>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as(&format!(
            "SELECT {} FROM proposals ORDER BY created_at DESC",
            PROPOSAL_COLUMNS
        ))
        .fetch_all(db)
        .await
    }

    /// Proposals the user is principal investigator of, or created
    pub async fn list_for_user<'e, E>(db: E, user_id: &str) -> Result<Vec<Proposal>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as(&format!(
            "SELECT {} FROM proposals WHERE principal_investigator_id = ? OR created_by = ? ORDER BY created_at DESC",
            PROPOSAL_COLUMNS
        ))
        .bind(user_id)
        .bind(user_id)
        .fetch_all(db)
        .await
    }

    /// Proposals the reviewer holds an assignment for
    pub async fn list_assigned_to<'e, E>(
        db: E,
        reviewer_id: &str,
    ) -> Result<Vec<Proposal>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as(
            r#"
            SELECT p.id, p.title, p.abstract_text, p.principal_investigator_id, p.department_id,
                   p.created_by, p.requested_amount, p.status, p.created_at, p.updated_at
            FROM proposals p
            INNER JOIN proposal_reviewers pr ON pr.proposal_id = p.id
            WHERE pr.reviewer_id = ?
            ORDER BY pr.assigned_date DESC
            "#,
        )
        .bind(reviewer_id)
        .fetch_all(db)
        .await
    }

    pub async fn set_status<'e, E>(
        db: E,
        id: &str,
        status: ProposalStatus,
        now: &str,
    ) -> Result<(), sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query("UPDATE proposals SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(now)
            .bind(id)
            .execute(db)
            .await?;
        Ok(())
    }

    /// Overwrite the fields an investigator edits while drafting
    pub async fn update_details<'e, E>(
        db: E,
        id: &str,
        title: &str,
        abstract_text: Option<&str>,
        department_id: &str,
        requested_amount: Option<f64>,
        now: &str,
    ) -> Result<(), sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            r#"
            UPDATE proposals
            SET title = ?, abstract_text = ?, department_id = ?, requested_amount = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(title)
        .bind(abstract_text)
        .bind(department_id)
        .bind(requested_amount)
        .bind(now)
        .bind(id)
        .execute(db)
        .await?;
        Ok(())
    }

    /// Hard delete. Assignments and evaluations cascade.
    pub async fn delete<'e, E>(db: E, id: &str) -> Result<bool, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query("DELETE FROM proposals WHERE id = ?")
            .bind(id)
            .execute(db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
