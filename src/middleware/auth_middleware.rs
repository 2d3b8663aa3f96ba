// Authentication middleware for protected routes
// Extracts a credential, validates it, checks revocation, and binds the
// principal context to the request

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use std::time::Duration;
use tracing::warn;

use crate::{
    app::AppState,
    middleware::auth::AuthenticatedUser,
    services::revocation::RevocationPolicy,
    utils::{ApiError, ACCESS_TOKEN_COOKIE},
};

/// Middleware for protected routes: authentication failures are fatal
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    match authenticate(&state, request.headers()).await {
        Ok(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        },
        Err(err) => err.into_response(),
    }
}

/// Middleware for public routes: the same extraction runs, but failures are
/// non-fatal and the request proceeds without identity
pub async fn optional_auth(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    if let Ok(user) = authenticate(&state, request.headers()).await {
        request.extensions_mut().insert(user);
    }
    next.run(request).await
}

async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<AuthenticatedUser, ApiError> {
    let token = extract_credential(headers)
        .ok_or(ApiError::Unauthenticated("Authentication required"))?;

    let claims = state.jwt_service.parse(&token).await?;

    match &claims.jti {
        Some(jti) => {
            if revocation_verdict(state, jti).await? {
                return Err(ApiError::Unauthenticated("token has been revoked"));
            }
        },
        None => {
            warn!(
                sub = %claims.sub,
                "Accepted token without jti; it cannot be individually revoked"
            );
        },
    }

    Ok(AuthenticatedUser::from_claims(&claims))
}

/// Credential extraction order: Authorization header, then access cookie
fn extract_credential(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|t| t.to_string());

    bearer.or_else(|| {
        CookieJar::from_headers(headers)
            .get(ACCESS_TOKEN_COOKIE)
            .map(|c| c.value().to_string())
    })
}

/// Ask the revocation store about a jti under the per-request soft budget.
/// An unanswerable lookup resolves through the configured policy: fail-open
/// logs a warning and treats the token as not revoked, fail-closed surfaces
/// the outage to the caller.
pub async fn revocation_verdict(state: &AppState, jti: &str) -> Result<bool, ApiError> {
    let budget = Duration::from_millis(state.config.revocation.check_timeout_ms);
    let policy = RevocationPolicy::from_fail_open(state.config.revocation.fail_open);

    let outcome = tokio::time::timeout(budget, state.revocation_store.is_revoked(jti)).await;

    match outcome {
        Ok(Ok(revoked)) => Ok(revoked),
        Ok(Err(err)) => match policy {
            RevocationPolicy::FailOpen => {
                warn!(error = %err, jti, "Revocation store unavailable, continuing as not revoked");
                Ok(false)
            },
            RevocationPolicy::FailClosed => {
                Err(ApiError::DependencyUnavailable(err.to_string()))
            },
        },
        Err(_elapsed) => match policy {
            RevocationPolicy::FailOpen => {
                warn!(jti, "Revocation lookup exceeded budget, continuing as not revoked");
                Ok(false)
            },
            RevocationPolicy::FailClosed => Err(ApiError::DependencyUnavailable(
                "revocation lookup timed out".to_string(),
            )),
        },
    }
}
