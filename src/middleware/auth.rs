// Request-scoped principal context
// Created by the auth middleware, dropped with the request

use axum::{extract::FromRequestParts, http::request::Parts};
use serde::{Deserialize, Serialize};

use crate::{app::AppState, models::auth::TokenClaims, utils::ApiError};

/// Principal attributes bound to the request by the middleware.
/// Absence in the extensions means the request is unauthenticated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub user_id: String,
    /// Token identifier; absent for legacy tokens, which cannot be revoked
    pub jti: Option<String>,
    pub email: String,
    pub scope: Vec<String>,
    pub token_exp: u64,
}

impl AuthenticatedUser {
    pub fn from_claims(claims: &TokenClaims) -> Self {
        Self {
            user_id: claims.sub.clone(),
            jti: claims.jti.clone(),
            email: claims.email.clone(),
            scope: claims.scope.clone(),
            token_exp: claims.exp,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.scope.iter().any(|s| s == "admin")
    }
}

/// Extractor reading the principal the middleware bound to the request
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or(ApiError::Unauthenticated("Authentication required"))
    }
}

/// Infallible extractor for routes where identity is optional; `None` means
/// the caller is anonymous
pub struct MaybeUser(pub Option<AuthenticatedUser>);

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(parts.extensions.get::<AuthenticatedUser>().cloned()))
    }
}

/// Extractor gating the administrative surface on the admin capability
pub struct RequireAdmin(pub AuthenticatedUser);

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthenticatedUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            return Err(ApiError::Forbidden("Administrator capability required"));
        }
        Ok(RequireAdmin(user))
    }
}
