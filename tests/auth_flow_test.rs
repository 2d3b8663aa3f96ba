// Endpoint flow tests that need no database: logout revocation, token
// introspection, and refresh-token screening

mod common;

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    middleware::from_fn_with_state,
    routing::{get, post},
    Extension, Json, Router,
};
use http_body_util::BodyExt;
use tower::util::ServiceExt;

use bocchi_backend_core::{
    handlers::auth,
    middleware::{require_auth, AuthenticatedUser},
    AppState,
};
use common::{test_config, test_state, FailingStore, RecordingStore};

async fn me(Extension(user): Extension<AuthenticatedUser>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "user_id": user.user_id }))
}

fn app(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/auth/logout", post(auth::logout))
        .route("/api/v1/auth/validate", post(auth::validate_token))
        .route("/api/v1/auth/refresh", post(auth::refresh_token))
        .route(
            "/api/v1/users/me",
            get(me).layer(from_fn_with_state(state.clone(), require_auth)),
        )
        .with_state(state)
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn json_request(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Handlers with a ConnectInfo extractor need the peer address injected when
/// driven through oneshot
fn with_connect_info(mut request: Request<Body>) -> Request<Body> {
    let addr: std::net::SocketAddr = "192.0.2.10:4321".parse().unwrap();
    request
        .extensions_mut()
        .insert(axum::extract::ConnectInfo(addr));
    request
}

#[tokio::test]
async fn test_logout_revokes_and_clears_cookies() {
    let store = Arc::new(RecordingStore::default());
    let state = test_state(test_config(), store.clone());

    let (access, access_claims) = state
        .jwt_service
        .mint_access("u-1", "alice@example.com", vec![])
        .unwrap();
    let (refresh, refresh_claims) = state
        .jwt_service
        .mint_refresh("u-1", "alice@example.com")
        .unwrap();

    let app = app(state);
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/auth/logout")
                .header(
                    header::COOKIE,
                    format!(
                        "bocchi_access_token={}; bocchi_refresh_token={}",
                        access, refresh
                    ),
                )
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    // Both cookies are cleared via expired replacements
    let set_cookies: Vec<String> = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect();
    assert!(set_cookies
        .iter()
        .any(|c| c.starts_with("bocchi_access_token=") && c.contains("Max-Age")));
    assert!(set_cookies
        .iter()
        .any(|c| c.starts_with("bocchi_refresh_token=") && c.contains("Max-Age")));

    // Both jtis were revoked with the logout reason
    let reasons = store.reasons();
    assert!(reasons
        .iter()
        .any(|(jti, reason)| jti == access_claims.jti.as_deref().unwrap() && reason == "logout"));
    assert!(reasons
        .iter()
        .any(|(jti, reason)| jti == refresh_claims.jti.as_deref().unwrap() && reason == "logout"));

    // The revoked access token no longer authenticates
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/users/me")
                .header(header::AUTHORIZATION, format!("Bearer {}", access))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("token has been revoked"));
}

#[tokio::test]
async fn test_logout_without_cookies_still_succeeds() {
    let state = test_state(test_config(), Arc::new(RecordingStore::default()));
    let app = app(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/auth/logout")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_validate_reports_valid_token() {
    let state = test_state(test_config(), Arc::new(RecordingStore::default()));
    let (token, _) = state
        .jwt_service
        .mint_access("u-2", "bob@example.com", vec![])
        .unwrap();
    let app = app(state);

    let response = app
        .oneshot(json_request(
            "/api/v1/auth/validate",
            serde_json::json!({ "token": token }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["valid"], true);
    assert_eq!(body["claims"]["sub"], "u-2");
    assert_eq!(body["claims"]["type"], "access");
}

#[tokio::test]
async fn test_validate_reports_invalid_token_with_200() {
    let state = test_state(test_config(), Arc::new(RecordingStore::default()));
    let app = app(state);

    let response = app
        .oneshot(json_request(
            "/api/v1/auth/validate",
            serde_json::json!({ "token": "not.a.token" }),
        ))
        .await
        .unwrap();

    // Validity is in the body, not the status
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["valid"], false);
    assert!(body["error"].as_str().is_some());
    assert!(body.get("claims").is_none());
}

#[tokio::test]
async fn test_validate_reports_revoked_token() {
    let store = Arc::new(RecordingStore::default());
    let state = test_state(test_config(), store.clone());
    let (token, claims) = state
        .jwt_service
        .mint_access("u-3", "carol@example.com", vec![])
        .unwrap();
    store.revoke_jti(claims.jti.as_deref().unwrap());
    let app = app(state);

    let response = app
        .oneshot(json_request(
            "/api/v1/auth/validate",
            serde_json::json!({ "token": token }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["valid"], false);
    assert!(body["error"].as_str().unwrap().contains("revoked"));
}

#[tokio::test]
async fn test_validate_stays_200_when_store_is_down_and_fails_closed() {
    // Validity is in the body even when the revocation store cannot answer
    let mut config = test_config();
    config.revocation.fail_open = false;

    let state = test_state(config, Arc::new(FailingStore));
    let (token, _) = state
        .jwt_service
        .mint_access("u-6", "frank@example.com", vec![])
        .unwrap();
    let app = app(state);

    let response = app
        .oneshot(json_request(
            "/api/v1/auth/validate",
            serde_json::json!({ "token": token }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["valid"], false);
    assert!(body["error"].as_str().unwrap().contains("unavailable"));
}

#[tokio::test]
async fn test_validate_fails_open_when_store_is_down() {
    // Under the fail-open policy an unanswerable lookup counts as not revoked
    let state = test_state(test_config(), Arc::new(FailingStore));
    let (token, _) = state
        .jwt_service
        .mint_access("u-7", "grace@example.com", vec![])
        .unwrap();
    let app = app(state);

    let response = app
        .oneshot(json_request(
            "/api/v1/auth/validate",
            serde_json::json!({ "token": token }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["valid"], true);
}

#[tokio::test]
async fn test_validate_requires_a_token() {
    let state = test_state(test_config(), Arc::new(RecordingStore::default()));
    let app = app(state);

    let response = app
        .oneshot(json_request(
            "/api/v1/auth/validate",
            serde_json::json!({ "token": "" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_refresh_rejects_access_tokens() {
    let state = test_state(test_config(), Arc::new(RecordingStore::default()));
    let (access, _) = state
        .jwt_service
        .mint_access("u-4", "dave@example.com", vec![])
        .unwrap();
    let app = app(state);

    let response = app
        .oneshot(with_connect_info(
            Request::builder()
                .method("POST")
                .uri("/api/v1/auth/refresh")
                .header(
                    header::COOKIE,
                    format!("bocchi_refresh_token={}", access),
                )
                .body(Body::empty())
                .unwrap(),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_refresh_rejects_revoked_refresh_token() {
    let store = Arc::new(RecordingStore::default());
    let state = test_state(test_config(), store.clone());
    let (refresh, claims) = state
        .jwt_service
        .mint_refresh("u-5", "erin@example.com")
        .unwrap();
    store.revoke_jti(claims.jti.as_deref().unwrap());
    let app = app(state);

    let response = app
        .oneshot(with_connect_info(
            Request::builder()
                .method("POST")
                .uri("/api/v1/auth/refresh")
                .header(
                    header::COOKIE,
                    format!("bocchi_refresh_token={}", refresh),
                )
                .body(Body::empty())
                .unwrap(),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("revoked"));
}

#[tokio::test]
async fn test_refresh_without_token_is_invalid_argument() {
    let state = test_state(test_config(), Arc::new(RecordingStore::default()));
    let app = app(state);

    let response = app
        .oneshot(with_connect_info(
            Request::builder()
                .method("POST")
                .uri("/api/v1/auth/refresh")
                .body(Body::empty())
                .unwrap(),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
