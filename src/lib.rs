pub mod api;
pub mod auth;
pub mod clock;
pub mod config;
pub mod db;
pub mod notifications;
pub mod review;

#[cfg(test)]
mod testing;

pub use db::DbPool;

use std::sync::Arc;

use crate::auth::{AuthorizationMatrix, PrincipalResolver, TokenCodec};
use crate::clock::Clock;
use crate::config::Config;
use crate::notifications::Notifier;
use crate::review::{EvaluationGate, ProposalLifecycle, ReviewerAssignmentManager};

pub struct AppState {
    pub config: Config,
    pub db: DbPool,
    pub clock: Arc<dyn Clock>,
    pub tokens: Arc<TokenCodec>,
    pub matrix: AuthorizationMatrix,
    pub resolver: PrincipalResolver,
    pub lifecycle: ProposalLifecycle,
    pub assignments: ReviewerAssignmentManager,
    pub evaluations: EvaluationGate,
}

impl AppState {
    /// Wire the review services around one pool, clock and notifier.
    ///
    /// `config.auth.jwt_secret` must already be populated.
    pub fn new(
        config: Config,
        db: DbPool,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let tokens = Arc::new(TokenCodec::from_config(&config.auth, clock.clone()));
        let resolver = PrincipalResolver::new(db.clone(), tokens.clone());
        let lifecycle = ProposalLifecycle::new(db.clone(), clock.clone());
        let assignments =
            ReviewerAssignmentManager::new(db.clone(), clock.clone(), notifier.clone());
        let evaluations = EvaluationGate::new(db.clone(), clock.clone(), notifier);

        Self {
            config,
            db,
            clock,
            tokens,
            matrix: AuthorizationMatrix::standard(),
            resolver,
            lifecycle,
            assignments,
            evaluations,
        }
    }
}
