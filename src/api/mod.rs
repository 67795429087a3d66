mod assignments;
pub mod auth;
pub mod error;
mod evaluations;
mod notifications;
mod proposals;
mod users;
mod validation;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let auth_routes = Router::new()
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/refresh", post(auth::refresh))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/admin/role", put(auth::update_role));

    let user_routes = Router::new()
        .route("/api/users", get(users::list_users).post(users::create_user))
        .route(
            "/api/users/profile",
            get(users::get_profile).put(users::update_profile),
        )
        .route("/api/users/:id", get(users::get_user).put(users::update_user))
        .route("/api/users/:id/activate", put(users::activate_user))
        .route("/api/users/:id/deactivate", put(users::deactivate_user));

    let proposal_routes = Router::new()
        .route(
            "/api/proposals",
            get(proposals::list_proposals).post(proposals::create_proposal),
        )
        .route(
            "/api/proposals/my-assigned-proposals",
            get(proposals::my_assigned_proposals),
        )
        .route(
            "/api/proposals/:id",
            get(proposals::get_proposal)
                .put(proposals::update_proposal)
                .delete(proposals::delete_proposal),
        )
        .route("/api/proposals/:id/submit", put(proposals::submit_proposal))
        .route("/api/proposals/:id/withdraw", put(proposals::withdraw_proposal))
        .route(
            "/api/proposals/:id/soft-delete",
            put(proposals::soft_delete_proposal),
        )
        .route(
            "/api/proposals/:id/can-delete",
            get(proposals::can_delete_proposal),
        );

    let assignment_routes = Router::new()
        .route(
            "/api/proposal-reviewers/assign",
            post(assignments::assign_reviewers),
        )
        .route(
            "/api/proposal-reviewers/my-assignments",
            get(assignments::my_assignments),
        )
        .route(
            "/api/proposal-reviewers/my-assignments/pending",
            get(assignments::my_pending_assignments),
        )
        .route(
            "/api/proposal-reviewers/my-assignments/completed",
            get(assignments::my_completed_assignments),
        )
        .route(
            "/api/proposal-reviewers/my-statistics",
            get(assignments::my_statistics),
        )
        .route(
            "/api/proposal-reviewers/my-proposal-ids",
            get(assignments::my_proposal_ids),
        )
        .route(
            "/api/proposal-reviewers/overdue",
            get(assignments::overdue_assignments),
        )
        .route(
            "/api/proposal-reviewers/proposal/:id",
            get(assignments::proposal_assignments),
        )
        .route(
            "/api/proposal-reviewers/check-assignment/:id",
            get(assignments::check_assignment),
        )
        .route(
            "/api/proposal-reviewers/reviewer/:id/statistics",
            get(assignments::reviewer_statistics),
        )
        .route(
            "/api/proposal-reviewers/:id/status",
            put(assignments::update_assignment_status),
        )
        .route(
            "/api/proposal-reviewers/:id",
            axum::routing::delete(assignments::remove_assignment),
        );

    let evaluation_routes = Router::new()
        .route(
            "/api/evaluations",
            get(evaluations::list_evaluations).post(evaluations::create_evaluation),
        )
        .route(
            "/api/evaluations/:id",
            get(evaluations::get_evaluation)
                .put(evaluations::update_evaluation)
                .delete(evaluations::delete_evaluation),
        )
        .route(
            "/api/evaluations/:id/finalize",
            put(evaluations::finalize_evaluation),
        )
        .route(
            "/api/evaluations/:id/unfinalize",
            put(evaluations::unfinalize_evaluation),
        )
        .route(
            "/api/evaluations/proposal/:id",
            get(evaluations::proposal_evaluations),
        )
        .route(
            "/api/evaluations/reviewer/:id",
            get(evaluations::reviewer_evaluations),
        );

    let notification_routes = Router::new()
        .route("/api/notifications", get(notifications::list_notifications))
        .route("/api/notifications/:id/read", put(notifications::mark_read));

    Router::new()
        .route("/health", get(health_check))
        .merge(auth_routes)
        .merge(user_routes)
        .merge(proposal_routes)
        .merge(assignment_routes)
        .merge(evaluation_routes)
        .merge(notification_routes)
        // The route matrix runs before every handler
        .layer(middleware::from_fn_with_state(state.clone(), auth::authorize))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::auth::TokenKind;
    use crate::config::Config;
    use crate::db::{ProposalStatus, Role, User};
    use crate::testing::{self, RecordingNotifier};

    async fn test_app() -> (Router, Arc<AppState>) {
        let mut config = Config::default();
        config.auth.jwt_secret = "router-test-secret".to_string();
        let state = Arc::new(AppState::new(
            config,
            testing::memory_pool().await,
            testing::manual_clock(),
            Arc::new(RecordingNotifier::default()),
        ));
        (create_router(state.clone()), state)
    }

    fn access_token(state: &AppState, user: &User) -> String {
        state
            .tokens
            .issue(&user.id, &user.username, user.role(), TokenKind::Access)
            .unwrap()
    }

    async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_health_is_public() {
        let (app, _) = test_app().await;
        let (status, _) = send(&app, Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_token_is_unauthorized() {
        let (app, _) = test_app().await;
        let (status, body) = send(&app, Method::GET, "/api/proposals", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "unauthorized");
    }

    #[tokio::test]
    async fn test_refresh_token_is_not_a_bearer() {
        let (app, state) = test_app().await;
        let pi = testing::seed_user(&state.db, "pia", Role::PrincipalInvestigator).await;
        let refresh = state
            .tokens
            .issue(&pi.id, &pi.username, pi.role(), TokenKind::Refresh)
            .unwrap();

        let (status, _) = send(&app, Method::GET, "/api/proposals", Some(&refresh), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_deactivated_user_is_rejected() {
        let (app, state) = test_app().await;
        let pi = testing::seed_user(&state.db, "pia", Role::PrincipalInvestigator).await;
        let token = access_token(&state, &pi);
        User::set_active(&state.db, &pi.id, false, "2026-03-02T09:00:00Z")
            .await
            .unwrap();

        let (status, _) = send(&app, Method::GET, "/api/proposals", Some(&token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_role_gate_is_forbidden() {
        let (app, state) = test_app().await;
        let reviewer = testing::seed_user(&state.db, "rev", Role::Reviewer).await;
        let token = access_token(&state, &reviewer);

        let draft = json!({ "title": "Soil carbon", "department_id": "agri" });
        let (status, body) =
            send(&app, Method::POST, "/api/proposals", Some(&token), Some(draft)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["code"], "forbidden");

        let (status, _) = send(&app, Method::GET, "/api/users", Some(&token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let (app, _) = test_app().await;
        let registration = json!({
            "username": "newpi",
            "email": "newpi@example.org",
            "password": "Str0ngPassw0rd!",
        });
        let (status, body) =
            send(&app, Method::POST, "/api/auth/register", None, Some(registration)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["user"]["role"], "PRINCIPAL_INVESTIGATOR");
        assert!(body["access_token"].is_string());

        let login = json!({ "username": "newpi@example.org", "password": "Str0ngPassw0rd!" });
        let (status, body) = send(&app, Method::POST, "/api/auth/login", None, Some(login)).await;
        assert_eq!(status, StatusCode::OK);
        let token = body["access_token"].as_str().unwrap().to_string();

        let (status, body) =
            send(&app, Method::GET, "/api/users/profile", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["username"], "newpi");

        let bad = json!({ "username": "newpi", "password": "wrong" });
        let (status, _) = send(&app, Method::POST, "/api/auth/login", None, Some(bad)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_resubmit_reports_current_status() {
        let (app, state) = test_app().await;
        let pi = testing::seed_user(&state.db, "pia", Role::PrincipalInvestigator).await;
        let proposal = testing::seed_proposal(&state.db, &pi, ProposalStatus::Submitted).await;
        let token = access_token(&state, &pi);

        let uri = format!("/api/proposals/{}/submit", proposal.id);
        let (status, body) = send(&app, Method::PUT, &uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "invalid_state");
        assert_eq!(body["error"]["details"]["current_status"], "SUBMITTED");
    }

    #[tokio::test]
    async fn test_admin_cannot_demote_self() {
        let (app, state) = test_app().await;
        let admin = testing::seed_user(&state.db, "root", Role::Admin).await;
        let token = access_token(&state, &admin);

        let body = json!({ "user_id": admin.id, "role": "REVIEWER" });
        let (status, _) =
            send(&app, Method::PUT, "/api/auth/admin/role", Some(&token), Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_review_flow_over_http() {
        let (app, state) = test_app().await;
        let pi = testing::seed_user(&state.db, "pia", Role::PrincipalInvestigator).await;
        let chair = testing::seed_user(&state.db, "chair", Role::CommitteeChair).await;
        let reviewer = testing::seed_user(&state.db, "rev", Role::Reviewer).await;
        let pi_token = access_token(&state, &pi);
        let chair_token = access_token(&state, &chair);
        let reviewer_token = access_token(&state, &reviewer);

        let draft = json!({
            "title": "Drought-tolerant maize trials",
            "abstract": "Three seasons of field trials.",
            "department_id": "agri",
            "requested_amount": 120000.0,
        });
        let (status, body) =
            send(&app, Method::POST, "/api/proposals", Some(&pi_token), Some(draft)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["status"], "DRAFT");
        let proposal_id = body["id"].as_str().unwrap().to_string();

        let uri = format!("/api/proposals/{}/submit", proposal_id);
        let (status, body) = send(&app, Method::PUT, &uri, Some(&pi_token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "SUBMITTED");

        let assign = json!({ "proposal_id": proposal_id, "reviewer_ids": [reviewer.id] });
        let (status, body) = send(
            &app,
            Method::POST,
            "/api/proposal-reviewers/assign",
            Some(&chair_token),
            Some(assign),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body[0]["status"], "PENDING");

        let uri = format!("/api/proposal-reviewers/check-assignment/{}", proposal_id);
        let (status, body) = send(&app, Method::GET, &uri, Some(&reviewer_token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["assigned"], true);

        let evaluation = json!({
            "proposal_id": proposal_id,
            "scores": { "technical": 8.5, "overall": 9.0 },
            "recommendation": "APPROVE",
        });
        let (status, body) = send(
            &app,
            Method::POST,
            "/api/evaluations",
            Some(&reviewer_token),
            Some(evaluation),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["reviewer_id"], reviewer.id.as_str());

        let uri = format!("/api/proposals/{}", proposal_id);
        let (status, body) = send(&app, Method::GET, &uri, Some(&pi_token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "APPROVED");

        let (status, body) =
            send(&app, Method::GET, "/api/notifications", Some(&pi_token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.as_array().is_some());
    }

    #[tokio::test]
    async fn test_head_follows_get_role_gate() {
        let (app, state) = test_app().await;
        let reviewer = testing::seed_user(&state.db, "rev", Role::Reviewer).await;
        let admin = testing::seed_user(&state.db, "root", Role::Admin).await;
        let reviewer_token = access_token(&state, &reviewer);
        let admin_token = access_token(&state, &admin);

        let (status, _) = send(&app, Method::GET, "/api/users", Some(&reviewer_token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) =
            send(&app, Method::HEAD, "/api/users", Some(&reviewer_token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send(&app, Method::HEAD, "/api/users", Some(&admin_token), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_refresh_issues_new_pair() {
        let (app, state) = test_app().await;
        let pi = testing::seed_user(&state.db, "pia", Role::PrincipalInvestigator).await;
        let refresh = state
            .tokens
            .issue(&pi.id, &pi.username, pi.role(), TokenKind::Refresh)
            .unwrap();

        let body = json!({ "refresh_token": refresh });
        let (status, body) = send(&app, Method::POST, "/api/auth/refresh", None, Some(body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["id"], pi.id.as_str());
        assert!(body["refresh_token"].is_string());

        let access = body["access_token"].as_str().unwrap().to_string();
        let (status, body) =
            send(&app, Method::GET, "/api/users/profile", Some(&access), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["username"], "pia");
    }

    #[tokio::test]
    async fn test_refresh_rejects_access_token() {
        let (app, state) = test_app().await;
        let pi = testing::seed_user(&state.db, "pia", Role::PrincipalInvestigator).await;

        let body = json!({ "refresh_token": access_token(&state, &pi) });
        let (status, body) = send(&app, Method::POST, "/api/auth/refresh", None, Some(body)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "unauthorized");
    }

    #[tokio::test]
    async fn test_refresh_rejects_deactivated_account() {
        let (app, state) = test_app().await;
        let pi = testing::seed_user(&state.db, "pia", Role::PrincipalInvestigator).await;
        let refresh = state
            .tokens
            .issue(&pi.id, &pi.username, pi.role(), TokenKind::Refresh)
            .unwrap();
        User::set_active(&state.db, &pi.id, false, "2026-03-02T09:00:00Z")
            .await
            .unwrap();

        let body = json!({ "refresh_token": refresh });
        let (status, _) = send(&app, Method::POST, "/api/auth/refresh", None, Some(body)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_draft_edit_over_http() {
        let (app, state) = test_app().await;
        let pi = testing::seed_user(&state.db, "pia", Role::PrincipalInvestigator).await;
        let proposal = testing::seed_proposal(&state.db, &pi, ProposalStatus::Draft).await;
        let token = access_token(&state, &pi);
        let uri = format!("/api/proposals/{}", proposal.id);
        let edit = json!({
            "title": "Coastal erosion monitoring",
            "department_id": "geo",
            "requested_amount": 9000.0,
        });

        let (status, body) =
            send(&app, Method::PUT, &uri, Some(&token), Some(edit.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["title"], "Coastal erosion monitoring");
        assert_eq!(body["status"], "DRAFT");

        let submit = format!("/api/proposals/{}/submit", proposal.id);
        let (status, _) = send(&app, Method::PUT, &submit, Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&app, Method::PUT, &uri, Some(&token), Some(edit)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["details"]["current_status"], "SUBMITTED");
    }
}
