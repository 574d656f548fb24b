// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{delete, get, patch, post, put},
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{admin, assessments, attempts, scopes},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware},
};

/// Assembles the main application router.
///
/// * Every `/api` route requires a bearer token; `/api/admin` also requires the admin role.
/// * Applies global middleware (Trace, CORS).
/// * Injects global state (engine, question bank, config).
pub fn create_router(state: AppState) -> Router {
    let origins = [
        HeaderValue::from_static("http://localhost:3000"),
        HeaderValue::from_static("http://127.0.0.1:3000"),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let admin_routes = Router::new()
        .route("/questions", post(admin::import_questions))
        .route("/questions/{id}", delete(admin::delete_question))
        .route("/scopes/{scope_id}/tests", post(admin::create_test))
        .route("/scopes/{scope_id}/auto-test", put(admin::put_auto_test))
        .route("/tests/{id}", patch(admin::rename_test))
        // Auth runs first (outermost), then the role check.
        .layer(middleware::from_fn(admin_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let scope_routes = Router::new()
        .route("/{scope_id}/tests", get(scopes::list_tests))
        .route("/{scope_id}/daily", get(scopes::daily_slot))
        .route("/{scope_id}/auto-test", get(scopes::get_auto_test));

    let test_routes = Router::new()
        .route("/{id}", get(assessments::get_test))
        .route("/{id}/attempts", post(assessments::start_attempt))
        .route("/{id}/leaderboard", get(assessments::get_leaderboard))
        .route("/{id}/events", get(assessments::events));

    let attempt_routes = Router::new()
        .route("/{id}", get(attempts::get_paper))
        .route("/{id}/answers", put(attempts::submit_answer))
        .route("/{id}/position", put(attempts::navigate))
        .route("/{id}/submit", post(attempts::submit_attempt))
        .route("/{id}/result", get(attempts::view_result))
        .route("/{id}/solutions", get(attempts::solutions))
        .route("/{id}/visibility", get(attempts::visibility));

    let user_routes = Router::new()
        .nest("/scopes", scope_routes)
        .nest("/tests", test_routes)
        .nest("/attempts", attempt_routes)
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .nest("/api/admin", admin_routes)
        .nest("/api", user_routes)
        // Global Middleware (applied from top to bottom)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{body::Body, http::Request, http::StatusCode};
    use tower::ServiceExt;

    use super::*;
    use crate::{
        config::Config,
        store::MemoryStore,
        utils::{
            clock::SystemClock,
            jwt::{ADMIN_ROLE, sign_jwt},
        },
    };

    fn app() -> Router {
        let state = AppState::new(
            Config::for_tests("secret"),
            Arc::new(MemoryStore::new()),
            Arc::new(SystemClock),
        );
        create_router(state)
    }

    async fn status_of(req: Request<Body>) -> StatusCode {
        app().oneshot(req).await.unwrap().status()
    }

    #[tokio::test]
    async fn test_missing_token_is_unauthorized() {
        let req = Request::get("/api/scopes/g1/tests").body(Body::empty()).unwrap();
        assert_eq!(status_of(req).await, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_admin_routes_require_admin_role() {
        let user = sign_jwt("u1", "Ada", "user", "secret", 60).unwrap();
        let req = Request::delete("/api/admin/questions/q1")
            .header(header::AUTHORIZATION, format!("Bearer {user}"))
            .body(Body::empty())
            .unwrap();
        assert_eq!(status_of(req).await, StatusCode::FORBIDDEN);

        let admin = sign_jwt("root", "Root", ADMIN_ROLE, "secret", 60).unwrap();
        let req = Request::delete("/api/admin/questions/q1")
            .header(header::AUTHORIZATION, format!("Bearer {admin}"))
            .body(Body::empty())
            .unwrap();
        assert_eq!(status_of(req).await, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_user_routes_accept_valid_token() {
        let user = sign_jwt("u1", "Ada", "user", "secret", 60).unwrap();
        let req = Request::get("/api/scopes/g1/tests")
            .header(header::AUTHORIZATION, format!("Bearer {user}"))
            .body(Body::empty())
            .unwrap();
        assert_eq!(status_of(req).await, StatusCode::OK);
    }
}
