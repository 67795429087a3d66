//! Funded projects spun out of approved proposals.

use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Project {
    pub id: String,
    pub proposal_id: String,
    pub name: String,
    pub created_at: String,
}

impl Project {
    pub async fn create<'e, E>(
        db: E,
        proposal_id: &str,
        name: &str,
        now: &str,
    ) -> Result<Project, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let project = Project {
            id: uuid::Uuid::new_v4().to_string(),
            proposal_id: proposal_id.to_string(),
            name: name.to_string(),
            created_at: now.to_string(),
        };

        sqlx::query("INSERT INTO projects (id, proposal_id, name, created_at) VALUES (?, ?, ?, ?)")
            .bind(&project.id)
            .bind(&project.proposal_id)
            .bind(&project.name)
            .bind(&project.created_at)
            .execute(db)
            .await?;

        Ok(project)
    }

    pub async fn exists_for_proposal<'e, E>(db: E, proposal_id: &str) -> Result<bool, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM projects WHERE proposal_id = ?")
            .bind(proposal_id)
            .fetch_one(db)
            .await?;
        Ok(count.0 > 0)
    }
}
