// Current-principal handlers
// Profile reads and updates, preference replacement, and the secure
// account-deletion protocol

use axum::{
    extract::{Extension, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use axum_extra::extract::cookie::CookieJar;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::{
    app::AppState,
    middleware::auth::AuthenticatedUser,
    models::{
        auth::TokenType,
        revocation::NewTokenRevocation,
        user::{Preferences, User, UserProfileChanges},
    },
    utils::{
        expired_cookie, log_account_deletion, trim_and_validate_field, ApiError,
        ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE,
    },
};

/// Public projection of a principal record
#[derive(Debug, Serialize)]
pub struct UserView {
    pub id: String,
    pub email: String,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    pub auth_provider: String,
    pub preferences: Preferences,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<User> for UserView {
    fn from(user: User) -> Self {
        Self {
            id: user.id.to_string(),
            email: user.email,
            display_name: user.display_name,
            avatar_url: user.avatar_url,
            auth_provider: user.auth_provider.as_str().to_string(),
            preferences: user.preferences,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

fn principal_uuid(user: &AuthenticatedUser) -> Result<Uuid, ApiError> {
    Uuid::parse_str(&user.user_id)
        .map_err(|_| ApiError::Internal(format!("malformed principal id {}", user.user_id)))
}

/// GET /api/v1/users/me - Full profile of the current principal
pub async fn get_me(
    Extension(user): Extension<AuthenticatedUser>,
    State(state): State<AppState>,
) -> Result<Json<UserView>, ApiError> {
    let user_id = principal_uuid(&user)?;

    let mut conn = state
        .diesel_pool
        .get()
        .await
        .map_err(|e| ApiError::DependencyUnavailable(e.to_string()))?;

    let record = User::find_by_id(&mut conn, user_id).await?;
    Ok(Json(UserView::from(record)))
}

/// PATCH /api/v1/users/me - Partial profile update; absent fields keep
/// their stored values
pub async fn update_me(
    Extension(user): Extension<AuthenticatedUser>,
    State(state): State<AppState>,
    Json(request): Json<UpdateProfileRequest>,
) -> Result<Json<UserView>, ApiError> {
    let user_id = principal_uuid(&user)?;

    if request.display_name.is_none() && request.avatar_url.is_none() {
        return Err(ApiError::InvalidArgument(
            "At least one field must be provided".to_string(),
        ));
    }

    let display_name = match request.display_name {
        Some(name) => Some(trim_and_validate_field(&name, true).map_err(|e| {
            ApiError::InvalidArgument(format!("display_name: {}", e))
        })?),
        None => None,
    };

    let changes = UserProfileChanges {
        display_name,
        avatar_url: request.avatar_url,
    };

    let mut conn = state
        .diesel_pool
        .get()
        .await
        .map_err(|e| ApiError::DependencyUnavailable(e.to_string()))?;

    let record = User::update_profile(&mut conn, user_id, changes).await?;
    Ok(Json(UserView::from(record)))
}

/// PUT /api/v1/users/me/preferences - Replace the preferences record
pub async fn update_my_preferences(
    Extension(user): Extension<AuthenticatedUser>,
    State(state): State<AppState>,
    Json(preferences): Json<Preferences>,
) -> Result<Json<UserView>, ApiError> {
    let user_id = principal_uuid(&user)?;

    let mut conn = state
        .diesel_pool
        .get()
        .await
        .map_err(|e| ApiError::DependencyUnavailable(e.to_string()))?;

    let record = User::update_preferences(&mut conn, user_id, preferences).await?;
    Ok(Json(UserView::from(record)))
}

/// DELETE /api/v1/users/me - Remove the principal and everything it owns
///
/// The transaction (reviews cascade + principal) is the primary operation
/// and its failure surfaces to the caller. Token revocation and cookie
/// clearing afterwards are best-effort: the data is already gone.
pub async fn delete_me(
    Extension(user): Extension<AuthenticatedUser>,
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Response, ApiError> {
    let user_id = principal_uuid(&user)?;

    let mut conn = state
        .diesel_pool
        .get()
        .await
        .map_err(|e| ApiError::DependencyUnavailable(e.to_string()))?;

    let report = User::delete_cascading(&mut conn, user_id).await?;

    if let Some(jti) = &user.jti {
        let expires_at =
            DateTime::<Utc>::from_timestamp(user.token_exp as i64, 0).unwrap_or_else(Utc::now);
        let entry = NewTokenRevocation::new(
            jti.clone(),
            TokenType::Access,
            expires_at,
            "account_deleted",
        );
        if let Err(e) = state.revocation_store.revoke(entry).await {
            warn!(error = %e, user_id = %user.user_id, "Failed to revoke token after deletion");
        }
    }

    let jar = jar
        .add(expired_cookie(ACCESS_TOKEN_COOKIE, &state.config))
        .add(expired_cookie(REFRESH_TOKEN_COOKIE, &state.config));

    log_account_deletion(&user.user_id, &user.email, report.reviews_deleted);

    Ok((StatusCode::NO_CONTENT, jar).into_response())
}
