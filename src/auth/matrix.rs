//! Route-level authorization table.
//!
//! Rules are checked top to bottom and the first match decides. Keep the
//! list ordered most specific first: public routes, then routes open to any
//! signed-in user, then role-gated routes with exact paths ahead of wildcards.
//! A path no rule matches requires authentication.

use axum::http::Method;

use super::principal::Principal;
use crate::db::Role;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodMatch {
    Any,
    Only(Method),
}

impl MethodMatch {
    fn matches(&self, method: &Method) -> bool {
        match self {
            MethodMatch::Any => true,
            // axum serves HEAD from GET handlers
            MethodMatch::Only(m) if *m == Method::GET => {
                *method == Method::GET || *method == Method::HEAD
            }
            MethodMatch::Only(m) => m == method,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    PermitAll,
    Authenticated,
    Roles(&'static [Role]),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    Unauthenticated,
    Forbidden,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Allow,
    Deny(Denial),
}

#[derive(Debug, Clone)]
pub struct Rule {
    pub method: MethodMatch,
    pub pattern: &'static str,
    pub decision: Decision,
}

impl Rule {
    fn any(pattern: &'static str, decision: Decision) -> Self {
        Self {
            method: MethodMatch::Any,
            pattern,
            decision,
        }
    }

    fn on(method: Method, pattern: &'static str, decision: Decision) -> Self {
        Self {
            method: MethodMatch::Only(method),
            pattern,
            decision,
        }
    }

    fn matches(&self, method: &Method, path: &str) -> bool {
        self.method.matches(method) && path_matches(self.pattern, path)
    }
}

/// `*` matches exactly one segment; a trailing `**` matches zero or more.
pub fn path_matches(pattern: &str, path: &str) -> bool {
    let mut pattern_segments = pattern.split('/').filter(|s| !s.is_empty());
    let mut path_segments = path.split('/').filter(|s| !s.is_empty());

    loop {
        match (pattern_segments.next(), path_segments.next()) {
            (Some("**"), _) => return true,
            (None, None) => return true,
            (Some("*"), Some(_)) => continue,
            (Some(expected), Some(actual)) if expected == actual => continue,
            _ => return false,
        }
    }
}

use Role::*;

const USER_DIRECTORY: &[Role] = &[
    Admin,
    DepartmentHead,
    CommitteeChair,
    ProjectManager,
    PrincipalInvestigator,
];
const PROPOSAL_BROWSERS: &[Role] = &[
    Admin,
    CommitteeChair,
    DepartmentHead,
    FinancialOfficer,
    ProjectManager,
    PrincipalInvestigator,
];
const PROPOSAL_AUTHORS: &[Role] = &[Admin, PrincipalInvestigator, ProjectManager];
const PROPOSAL_OWNERS: &[Role] = &[Admin, PrincipalInvestigator];
const PROPOSAL_RETIRERS: &[Role] = &[Admin, PrincipalInvestigator, ProjectManager, CommitteeChair];
const ADMIN_ONLY: &[Role] = &[Admin];
const REVIEWER_ONLY: &[Role] = &[Reviewer];
const ASSIGNERS: &[Role] = &[CommitteeChair, Admin];
const ASSIGNMENT_VIEWERS: &[Role] = &[CommitteeChair, Admin, PrincipalInvestigator];
const ASSIGNMENT_UPDATERS: &[Role] = &[Reviewer, CommitteeChair, Admin];
const EVALUATION_BROWSERS: &[Role] = &[Admin, CommitteeChair, DepartmentHead];
const EVALUATORS: &[Role] = &[Admin, Reviewer, CommitteeChair];

pub struct AuthorizationMatrix {
    rules: Vec<Rule>,
}

impl AuthorizationMatrix {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// The table the HTTP surface is served with.
    pub fn standard() -> Self {
        use Decision::{Authenticated, PermitAll, Roles};

        Self::new(vec![
            // Public
            Rule::any("/health", PermitAll),
            Rule::on(Method::POST, "/api/auth/login", PermitAll),
            Rule::on(Method::POST, "/api/auth/register", PermitAll),
            Rule::on(Method::POST, "/api/auth/refresh", PermitAll),
            // Any signed-in user
            Rule::any("/api/auth/logout", Authenticated),
            Rule::any("/api/users/profile", Authenticated),
            Rule::any("/api/notifications/**", Authenticated),
            // Accounts
            Rule::any("/api/auth/admin/**", Roles(ADMIN_ONLY)),
            Rule::on(Method::GET, "/api/users", Roles(USER_DIRECTORY)),
            Rule::on(Method::GET, "/api/users/**", Roles(USER_DIRECTORY)),
            Rule::on(Method::PUT, "/api/users/*/activate", Roles(ADMIN_ONLY)),
            Rule::on(Method::PUT, "/api/users/*/deactivate", Roles(ADMIN_ONLY)),
            Rule::on(Method::PUT, "/api/users/**", Authenticated),
            Rule::on(Method::POST, "/api/users", Roles(ADMIN_ONLY)),
            // Proposals
            Rule::on(Method::GET, "/api/proposals/my-assigned-proposals", Roles(REVIEWER_ONLY)),
            Rule::on(Method::GET, "/api/proposals", Roles(PROPOSAL_BROWSERS)),
            Rule::on(Method::POST, "/api/proposals", Roles(PROPOSAL_AUTHORS)),
            Rule::on(Method::GET, "/api/proposals/*/can-delete", Roles(PROPOSAL_RETIRERS)),
            Rule::on(Method::PUT, "/api/proposals/*/submit", Roles(PROPOSAL_OWNERS)),
            Rule::on(Method::PUT, "/api/proposals/*/withdraw", Roles(PROPOSAL_OWNERS)),
            Rule::on(Method::PUT, "/api/proposals/*/soft-delete", Roles(PROPOSAL_RETIRERS)),
            Rule::on(Method::PUT, "/api/proposals/**", Roles(PROPOSAL_OWNERS)),
            Rule::on(Method::DELETE, "/api/proposals/**", Roles(ADMIN_ONLY)),
            Rule::on(Method::GET, "/api/proposals/*", Authenticated),
            // Reviewer assignments
            Rule::on(Method::POST, "/api/proposal-reviewers/assign", Roles(ASSIGNERS)),
            Rule::on(Method::GET, "/api/proposal-reviewers/my-assignments/**", Roles(REVIEWER_ONLY)),
            Rule::on(Method::GET, "/api/proposal-reviewers/my-statistics", Roles(REVIEWER_ONLY)),
            Rule::on(Method::GET, "/api/proposal-reviewers/my-proposal-ids", Roles(REVIEWER_ONLY)),
            Rule::on(Method::GET, "/api/proposal-reviewers/check-assignment/*", Roles(REVIEWER_ONLY)),
            Rule::on(Method::GET, "/api/proposal-reviewers/overdue", Roles(ASSIGNERS)),
            Rule::on(Method::GET, "/api/proposal-reviewers/proposal/*", Roles(ASSIGNMENT_VIEWERS)),
            Rule::on(Method::GET, "/api/proposal-reviewers/reviewer/*/statistics", Roles(ASSIGNMENT_UPDATERS)),
            Rule::on(Method::PUT, "/api/proposal-reviewers/*/status", Roles(ASSIGNMENT_UPDATERS)),
            Rule::on(Method::DELETE, "/api/proposal-reviewers/*", Roles(ASSIGNERS)),
            // Evaluations
            Rule::on(Method::GET, "/api/evaluations", Roles(EVALUATION_BROWSERS)),
            Rule::on(Method::POST, "/api/evaluations", Roles(EVALUATORS)),
            Rule::on(Method::PUT, "/api/evaluations/**", Roles(EVALUATORS)),
            Rule::on(Method::DELETE, "/api/evaluations/**", Roles(ASSIGNERS)),
        ])
    }

    pub fn decision_for(&self, method: &Method, path: &str) -> Decision {
        self.rules
            .iter()
            .find(|rule| rule.matches(method, path))
            .map(|rule| rule.decision)
            .unwrap_or(Decision::Authenticated)
    }

    pub fn authorize(&self, principal: Option<&Principal>, method: &Method, path: &str) -> Access {
        match (self.decision_for(method, path), principal) {
            (Decision::PermitAll, _) => Access::Allow,
            (_, None) => Access::Deny(Denial::Unauthenticated),
            (Decision::Authenticated, Some(_)) => Access::Allow,
            (Decision::Roles(roles), Some(p)) if p.has_any_role(roles) => Access::Allow,
            (Decision::Roles(_), Some(_)) => Access::Deny(Denial::Forbidden),
        }
    }
}
