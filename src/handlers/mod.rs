// HTTP surface of the authentication core

pub mod admin;
pub mod auth;
pub mod users;

use axum::{
    extract::State,
    http::StatusCode,
    middleware as axum_middleware,
    response::{IntoResponse, Json},
    routing::{get, post, put},
    Router,
};

use crate::{
    app::AppState,
    db::check_diesel_health,
    middleware::{optional_auth, require_auth},
};

/// Authentication routes; all public, status carries optional identity
pub fn auth_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/token", post(auth::issue_token))
        .route("/refresh", post(auth::refresh_token))
        .route("/signin", post(auth::signin))
        .route("/logout", post(auth::logout))
        .route("/validate", post(auth::validate_token))
        .route(
            "/status",
            get(auth::auth_status).layer(axum_middleware::from_fn_with_state(
                state,
                optional_auth,
            )),
        )
}

/// Current-principal routes; everything requires authentication
pub fn user_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/me",
            get(users::get_me)
                .patch(users::update_me)
                .delete(users::delete_me),
        )
        .route("/me/preferences", put(users::update_my_preferences))
        .route_layer(axum_middleware::from_fn_with_state(state, require_auth))
}

/// Administrative routes; authentication plus the admin capability
pub fn admin_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/revocations/sweep", post(admin::sweep_revocations))
        .route_layer(axum_middleware::from_fn_with_state(state, require_auth))
}

/// GET /health - Liveness and database reachability
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let timestamp = chrono::Utc::now().to_rfc3339();

    let (healthy, database) = match check_diesel_health(&state.diesel_pool).await {
        Ok(_) => (true, serde_json::json!({ "status": "healthy", "error": null })),
        Err(e) => (
            false,
            serde_json::json!({
                "status": "unhealthy",
                "error": format!("Database connection failed: {}", e)
            }),
        ),
    };

    let response = serde_json::json!({
        "status": if healthy { "healthy" } else { "degraded" },
        "service": "bocchi-backend",
        "timestamp": timestamp,
        "components": {
            "postgresql": database
        }
    });

    if healthy {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}
