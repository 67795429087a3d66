//! User accounts and organisational roles.

use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite};

/// The eight organisational roles. Every user holds exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    ProjectManager,
    PrincipalInvestigator,
    Reviewer,
    CommitteeChair,
    DepartmentHead,
    FinancialOfficer,
    Stakeholder,
}

impl Role {
    pub const ALL: [Role; 8] = [
        Role::Admin,
        Role::ProjectManager,
        Role::PrincipalInvestigator,
        Role::Reviewer,
        Role::CommitteeChair,
        Role::DepartmentHead,
        Role::FinancialOfficer,
        Role::Stakeholder,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::ProjectManager => "PROJECT_MANAGER",
            Role::PrincipalInvestigator => "PRINCIPAL_INVESTIGATOR",
            Role::Reviewer => "REVIEWER",
            Role::CommitteeChair => "COMMITTEE_CHAIR",
            Role::DepartmentHead => "DEPARTMENT_HEAD",
            Role::FinancialOfficer => "FINANCIAL_OFFICER",
            Role::Stakeholder => "STAKEHOLDER",
        }
    }

    /// Roles allowed to hand out and withdraw reviewer assignments
    pub fn can_manage_assignments(&self) -> bool {
        matches!(self, Role::Admin | Role::CommitteeChair)
    }

    /// Roles allowed to edit accounts other than their own
    pub fn can_manage_users(&self) -> bool {
        matches!(self, Role::Admin | Role::DepartmentHead)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "ADMIN" => Ok(Role::Admin),
            "PROJECT_MANAGER" => Ok(Role::ProjectManager),
            "PRINCIPAL_INVESTIGATOR" => Ok(Role::PrincipalInvestigator),
            "REVIEWER" => Ok(Role::Reviewer),
            "COMMITTEE_CHAIR" => Ok(Role::CommitteeChair),
            "DEPARTMENT_HEAD" => Ok(Role::DepartmentHead),
            "FINANCIAL_OFFICER" => Ok(Role::FinancialOfficer),
            "STAKEHOLDER" => Ok(Role::Stakeholder),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

impl From<String> for Role {
    /// Unknown stored values degrade to the least privileged role
    fn from(s: String) -> Self {
        s.parse().unwrap_or(Role::Stakeholder)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: String,
    pub is_active: i32,
    pub department_id: Option<String>,
    pub last_login: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl User {
    pub fn role(&self) -> Role {
        Role::from(self.role.clone())
    }

    pub fn active(&self) -> bool {
        self.is_active != 0
    }
}

/// Public view of a user; never carries the password hash
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: String,
    pub username: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Role,
    pub is_active: bool,
    pub department_id: Option<String>,
    pub last_login: Option<String>,
    pub created_at: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            role: user.role(),
            is_active: user.active(),
            id: user.id,
            username: user.username,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            department_id: user.department_id,
            last_login: user.last_login,
            created_at: user.created_at,
        }
    }
}

/// Fields for inserting a user. The caller supplies the hash, never the password.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Role,
    pub department_id: Option<String>,
}

/// Partial profile update; `None` leaves the column untouched
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserChanges {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub department_id: Option<String>,
}

const USER_COLUMNS: &str = "id, username, email, password_hash, first_name, last_name, role, \
    is_active, department_id, last_login, created_at, updated_at";

impl User {
    pub async fn create<'e, E>(db: E, new: &NewUser, now: &str) -> Result<User, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let user = User {
            id: uuid::Uuid::new_v4().to_string(),
            username: new.username.clone(),
            email: new.email.clone(),
            password_hash: new.password_hash.clone(),
            first_name: new.first_name.clone(),
            last_name: new.last_name.clone(),
            role: new.role.to_string(),
            is_active: 1,
            department_id: new.department_id.clone(),
            last_login: None,
            created_at: now.to_string(),
            updated_at: now.to_string(),
        };

        sqlx::query(
            r#"
            INSERT INTO users (id, username, email, password_hash, first_name, last_name, role, is_active, department_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, 1, ?, ?, ?)
            "#,
        )
        .bind(&user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.role)
        .bind(&user.department_id)
        .bind(&user.created_at)
        .bind(&user.updated_at)
        .execute(db)
        .await?;

        Ok(user)
    }

    pub async fn find_by_id<'e, E>(db: E, id: &str) -> Result<Option<User>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
            .bind(id)
            .fetch_optional(db)
            .await
    }

    pub async fn find_by_username<'e, E>(
        db: E,
        username: &str,
    ) -> Result<Option<User>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as(&format!(
            "SELECT {} FROM users WHERE username = ?",
            USER_COLUMNS
        ))
        .bind(username)
        .fetch_optional(db)
        .await
    }

    /// Look a user up by username or email, whichever matches
    pub async fn find_by_login<'e, E>(db: E, login: &str) -> Result<Option<User>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as(&format!(
            "SELECT {} FROM users WHERE username = ? OR email = ? LIMIT 1",
            USER_COLUMNS
        ))
        .bind(login)
        .bind(login)
        .fetch_optional(db)
        .await
    }

    pub async fn list<'e, E>(db: E) -> Result<Vec<User>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as(&format!(
            "SELECT {} FROM users ORDER BY username ASC",
            USER_COLUMNS
        ))
        .fetch_all(db)
        .await
    }

    /// Apply a profile update. Returns false if no such user exists.
    pub async fn update_profile<'e, E>(
        db: E,
        id: &str,
        changes: &UserChanges,
        now: &str,
    ) -> Result<bool, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            r#"
            UPDATE users SET
                email = COALESCE(?, email),
                first_name = COALESCE(?, first_name),
                last_name = COALESCE(?, last_name),
                department_id = COALESCE(?, department_id),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&changes.email)
        .bind(&changes.first_name)
        .bind(&changes.last_name)
        .bind(&changes.department_id)
        .bind(now)
        .bind(id)
        .execute(db)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn set_role<'e, E>(db: E, id: &str, role: Role, now: &str) -> Result<bool, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query("UPDATE users SET role = ?, updated_at = ? WHERE id = ?")
            .bind(role.as_str())
            .bind(now)
            .bind(id)
            .execute(db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_active<'e, E>(
        db: E,
        id: &str,
        active: bool,
        now: &str,
    ) -> Result<bool, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query("UPDATE users SET is_active = ?, updated_at = ? WHERE id = ?")
            .bind(active as i32)
            .bind(now)
            .bind(id)
            .execute(db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn touch_last_login<'e, E>(db: E, id: &str, now: &str) -> Result<(), sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query("UPDATE users SET last_login = ? WHERE id = ?")
            .bind(now)
            .bind(id)
            .execute(db)
            .await?;
        Ok(())
    }
}
