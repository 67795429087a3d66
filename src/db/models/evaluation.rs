//! Scored reviewer evaluations.

use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recommendation {
    Approve,
    Reject,
    MinorRevisions,
    MajorRevisions,
}

impl Recommendation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Recommendation::Approve => "APPROVE",
            Recommendation::Reject => "REJECT",
            Recommendation::MinorRevisions => "MINOR_REVISIONS",
            Recommendation::MajorRevisions => "MAJOR_REVISIONS",
        }
    }
}

impl std::fmt::Display for Recommendation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Recommendation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "APPROVE" => Ok(Recommendation::Approve),
            "REJECT" => Ok(Recommendation::Reject),
            "MINOR_REVISIONS" => Ok(Recommendation::MinorRevisions),
            "MAJOR_REVISIONS" => Ok(Recommendation::MajorRevisions),
            _ => Err(format!("Unknown recommendation: {}", s)),
        }
    }
}

impl From<String> for Recommendation {
    /// An unreadable stored value never counts as an approval
    fn from(s: String) -> Self {
        s.parse().unwrap_or(Recommendation::MajorRevisions)
    }
}

/// Optional sub-scores, each on a 0 to 10 scale
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Scores {
    pub technical: Option<f64>,
    pub innovation: Option<f64>,
    pub feasibility: Option<f64>,
    pub budget: Option<f64>,
    pub impact: Option<f64>,
    pub overall: Option<f64>,
}

impl Scores {
    pub const MIN: f64 = 0.0;
    pub const MAX: f64 = 10.0;

    /// Names of the sub-scores that are set but outside the allowed range
    pub fn out_of_range(&self) -> Vec<&'static str> {
        [
            ("technical_score", self.technical),
            ("innovation_score", self.innovation),
            ("feasibility_score", self.feasibility),
            ("budget_score", self.budget),
            ("impact_score", self.impact),
            ("overall_score", self.overall),
        ]
        .into_iter()
        .filter_map(|(name, value)| match value {
            Some(v) if !(Self::MIN..=Self::MAX).contains(&v) => Some(name),
            _ => None,
        })
        .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Evaluation {
    pub id: String,
    pub proposal_id: String,
    pub reviewer_id: String,
    pub evaluation_stage: Option<String>,
    pub technical_score: Option<f64>,
    pub innovation_score: Option<f64>,
    pub feasibility_score: Option<f64>,
    pub budget_score: Option<f64>,
    pub impact_score: Option<f64>,
    pub overall_score: Option<f64>,
    pub comments: Option<String>,
    pub recommendation: String,
    pub is_final: i32,
    pub conflict_of_interest: i32,
    pub evaluation_date: String,
    pub updated_at: String,
}

impl Evaluation {
    pub fn recommendation(&self) -> Recommendation {
        Recommendation::from(self.recommendation.clone())
    }

    pub fn is_final(&self) -> bool {
        self.is_final != 0
    }

    pub fn scores(&self) -> Scores {
        Scores {
            technical: self.technical_score,
            innovation: self.innovation_score,
            feasibility: self.feasibility_score,
            budget: self.budget_score,
            impact: self.impact_score,
            overall: self.overall_score,
        }
    }

    pub fn set_scores(&mut self, scores: Scores) {
        self.technical_score = scores.technical;
        self.innovation_score = scores.innovation;
        self.feasibility_score = scores.feasibility;
        self.budget_score = scores.budget;
        self.impact_score = scores.impact;
        self.overall_score = scores.overall;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResponse {
    pub id: String,
    pub proposal_id: String,
    pub reviewer_id: String,
    pub evaluation_stage: Option<String>,
    pub scores: Scores,
    pub comments: Option<String>,
    pub recommendation: Recommendation,
    pub is_final: bool,
    pub conflict_of_interest: bool,
    pub evaluation_date: String,
    pub updated_at: String,
}

impl From<Evaluation> for EvaluationResponse {
    fn from(e: Evaluation) -> Self {
        Self {
            scores: e.scores(),
            recommendation: e.recommendation(),
            is_final: e.is_final(),
            conflict_of_interest: e.conflict_of_interest != 0,
            id: e.id,
            proposal_id: e.proposal_id,
            reviewer_id: e.reviewer_id,
            evaluation_stage: e.evaluation_stage,
            comments: e.comments,
            evaluation_date: e.evaluation_date,
            updated_at: e.updated_at,
        }
    }
}

const EVALUATION_COLUMNS: &str = "id, proposal_id, reviewer_id, evaluation_stage, \
    technical_score, innovation_score, feasibility_score, budget_score, impact_score, \
    overall_score, comments, recommendation, is_final, conflict_of_interest, \
    evaluation_date, updated_at";

impl Evaluation {
    pub async fn insert<'e, E>(db: E, evaluation: &Evaluation) -> Result<(), sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            r#"
            INSERT INTO evaluations (id, proposal_id, reviewer_id, evaluation_stage, technical_score, innovation_score, feasibility_score, budget_score, impact_score, overall_score, comments, recommendation, is_final, conflict_of_interest, evaluation_date, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&evaluation.id)
        .bind(&evaluation.proposal_id)
        .bind(&evaluation.reviewer_id)
        .bind(&evaluation.evaluation_stage)
        .bind(evaluation.technical_score)
        .bind(evaluation.innovation_score)
        .bind(evaluation.feasibility_score)
        .bind(evaluation.budget_score)
        .bind(evaluation.impact_score)
        .bind(evaluation.overall_score)
        .bind(&evaluation.comments)
        .bind(&evaluation.recommendation)
        .bind(evaluation.is_final)
        .bind(evaluation.conflict_of_interest)
        .bind(&evaluation.evaluation_date)
        .bind(&evaluation.updated_at)
        .execute(db)
        .await?;
        Ok(())
    }

    /// Write back every mutable column of an existing evaluation
    pub async fn save<'e, E>(db: E, evaluation: &Evaluation) -> Result<(), sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            r#"
            UPDATE evaluations SET
                evaluation_stage = ?,
                technical_score = ?,
                innovation_score = ?,
                feasibility_score = ?,
                budget_score = ?,
                impact_score = ?,
                overall_score = ?,
                comments = ?,
                recommendation = ?,
                is_final = ?,
                conflict_of_interest = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&evaluation.evaluation_stage)
        .bind(evaluation.technical_score)
        .bind(evaluation.innovation_score)
        .bind(evaluation.feasibility_score)
        .bind(evaluation.budget_score)
        .bind(evaluation.impact_score)
        .bind(evaluation.overall_score)
        .bind(&evaluation.comments)
        .bind(&evaluation.recommendation)
        .bind(evaluation.is_final)
        .bind(evaluation.conflict_of_interest)
        .bind(&evaluation.updated_at)
        .bind(&evaluation.id)
        .execute(db)
        .await?;
        Ok(())
    }

    pub async fn find_by_id<'e, E>(db: E, id: &str) -> Result<Option<Evaluation>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as(&format!(
            "SELECT {} FROM evaluations WHERE id = ?",
            EVALUATION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(db)
        .await
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
            "SELECT COUNT(*) FROM evaluations WHERE proposal_id = ? AND reviewer_id = ?",
        )
        .bind(proposal_id)
        .bind(reviewer_id)
        .fetch_one(db)
        .await?;
        Ok(count.0 > 0)
    }

    pub async fn list<'e, E>(db: E) -> Result<Vec<Evaluation>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as(&format!(
            "SELECT {} FROM evaluations ORDER BY evaluation_date DESC",
            EVALUATION_COLUMNS
        ))
        .fetch_all(db)
        .await
    }

    pub async fn list_for_proposal<'e, E>(
        db: E,
        proposal_id: &str,
    ) -> Result<Vec<Evaluation>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as(&format!(
            "SELECT {} FROM evaluations WHERE proposal_id = ? ORDER BY evaluation_date ASC",
            EVALUATION_COLUMNS
        ))
        .bind(proposal_id)
        .fetch_all(db)
        .await
    }

    pub async fn list_for_reviewer<'e, E>(
        db: E,
        reviewer_id: &str,
    ) -> Result<Vec<Evaluation>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as(&format!(
            "SELECT {} FROM evaluations WHERE reviewer_id = ? ORDER BY evaluation_date DESC",
            EVALUATION_COLUMNS
        ))
        .bind(reviewer_id)
        .fetch_all(db)
        .await
    }

    pub async fn delete<'e, E>(db: E, id: &str) -> Result<bool, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query("DELETE FROM evaluations WHERE id = ?")
            .bind(id)
            .execute(db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_for_proposal<'e, E>(db: E, proposal_id: &str) -> Result<u64, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query("DELETE FROM evaluations WHERE proposal_id = ?")
            .bind(proposal_id)
            .execute(db)
            .await?;
        Ok(result.rows_affected())
    }
}
