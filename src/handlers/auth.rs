// Authentication handlers
// Token issuance, refresh, logout, introspection, status, and federated
// sign-in completion

use axum::{
    body::Bytes,
    extract::{ConnectInfo, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use axum_extra::extract::cookie::CookieJar;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::str::FromStr;
use subtle::ConstantTimeEq;
use tracing::warn;
use validator::Validate;

use crate::{
    app::AppState,
    handlers::users::UserView,
    middleware::auth::MaybeUser,
    middleware::auth_middleware::revocation_verdict,
    models::{
        auth::{TokenClaims, TokenType},
        revocation::NewTokenRevocation,
        user::{AuthProvider, SigninProfile, User, UserError},
    },
    services::{jwt::JwtError, keys::KeyError},
    utils::{
        access_token_cookie, client_ip, expired_cookie, refresh_token_cookie,
        trim_optional_field, ApiError, ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE,
    },
};

// =============================================================================
// REQUEST/RESPONSE TYPES
// =============================================================================

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct IssueTokenRequest {
    #[validate(email(message = "Invalid email format"))]
    #[validate(length(max = 255, message = "Email must be at most 255 characters"))]
    pub email: String,

    #[validate(length(min = 1, message = "Provider is required"))]
    pub provider: String,

    #[validate(length(min = 1, message = "Provider id is required"))]
    pub provider_id: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RefreshRequest {
    // Optional for web clients, which carry the token in a cookie
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct SigninRequest {
    #[validate(length(min = 1, message = "Provider is required"))]
    pub provider: String,

    #[validate(length(min = 1, message = "Identity token is required"))]
    pub id_token: String,
}

#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    pub token: String,
}

/// Expiration metadata echoed after issuance; the tokens themselves travel
/// only in the cookies
#[derive(Debug, Serialize)]
pub struct TokenPairResponse {
    pub token_type: String,
    pub expires_in: u64,
    pub expires_at: u64,
    pub refresh_expires_in: u64,
    pub refresh_expires_at: u64,
}

#[derive(Debug, Serialize)]
pub struct SigninResponse {
    pub user: UserView,
    pub created: bool,
    pub tokens: TokenPairResponse,
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ValidateResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claims: Option<ClaimsView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Introspection projection of token claims; no key material ever appears here
#[derive(Debug, Serialize)]
pub struct ClaimsView {
    pub sub: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
    pub iat: u64,
    pub exp: u64,
    #[serde(rename = "type")]
    pub token_type: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub scope: Vec<String>,
}

impl From<&TokenClaims> for ClaimsView {
    fn from(claims: &TokenClaims) -> Self {
        Self {
            sub: claims.sub.clone(),
            email: claims.email.clone(),
            jti: claims.jti.clone(),
            iat: claims.iat,
            exp: claims.exp,
            token_type: claims.token_type.as_str().to_string(),
            scope: claims.scope.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<StatusUser>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_info: Option<TokenInfo>,
}

#[derive(Debug, Serialize)]
pub struct StatusUser {
    pub id: String,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct TokenInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
    pub expires_at: u64,
}

// =============================================================================
// HELPERS
// =============================================================================

/// Gate a credential-issuing endpoint on the per-client fixed window
fn rate_limit_guard(
    state: &AppState,
    endpoint: &str,
    headers: &HeaderMap,
    addr: &SocketAddr,
) -> Result<(), ApiError> {
    if !state.config.rate_limit.enabled {
        return Ok(());
    }

    let key = format!("{}:{}", endpoint, client_ip(headers, addr));
    let decision = state.rate_limiter.allow(&key);
    if decision.allowed {
        return Ok(());
    }

    warn!(key = %key, endpoint, "Rate limit exceeded");
    Err(ApiError::RateLimited {
        limit: decision.limit,
        window: decision.window_seconds,
        retry_after: decision.retry_after,
    })
}

fn validation_message(errors: &validator::ValidationErrors) -> String {
    errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errors)| {
            errors.iter().map(move |e| {
                let message = e
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| e.code.to_string());
                format!("{}: {}", field, message)
            })
        })
        .collect::<Vec<String>>()
        .join(", ")
}

/// Constant-time email comparison; the stored and presented addresses are
/// lowercased first so the comparison is case-insensitive
fn emails_match(presented: &str, stored: &str) -> bool {
    let presented = presented.trim().to_lowercase();
    let stored = stored.trim().to_lowercase();
    presented.as_bytes().ct_eq(stored.as_bytes()).into()
}

/// Scope granted at mint time; the single admin capability hook
fn scope_for(state: &AppState, email: &str) -> Vec<String> {
    let is_admin = state
        .config
        .admin_emails
        .iter()
        .any(|admin| admin.eq_ignore_ascii_case(email));
    if is_admin {
        vec!["admin".to_string()]
    } else {
        Vec::new()
    }
}

/// Mint the access/refresh pair and attach both cookies to the jar
fn mint_token_pair(
    state: &AppState,
    user_id: &str,
    email: &str,
    jar: CookieJar,
) -> Result<(CookieJar, TokenPairResponse), ApiError> {
    let scope = scope_for(state, email);

    let (access_token, access_claims) = state
        .jwt_service
        .mint_access(user_id, email, scope)
        .map_err(ApiError::from)?;
    let (refresh_token, refresh_claims) = state
        .jwt_service
        .mint_refresh(user_id, email)
        .map_err(ApiError::from)?;

    let jar = jar
        .add(access_token_cookie(
            access_token,
            state.jwt_service.access_expiry(),
            &state.config,
        ))
        .add(refresh_token_cookie(
            refresh_token,
            state.jwt_service.refresh_expiry(),
            &state.config,
        ));

    let response = TokenPairResponse {
        token_type: "Bearer".to_string(),
        expires_in: state.jwt_service.access_expiry(),
        expires_at: access_claims.exp,
        refresh_expires_in: state.jwt_service.refresh_expiry(),
        refresh_expires_at: refresh_claims.exp,
    };

    Ok((jar, response))
}

/// Validate JWT token format (must have exactly 3 parts separated by dots)
fn is_valid_jwt_format(token: &str) -> bool {
    token.split('.').count() == 3
}

/// Extract the refresh token from the cookie (web) or JSON body (mobile)
fn extract_refresh_token(jar: &CookieJar, body: &Bytes) -> Result<String, ApiError> {
    if let Some(cookie) = jar.get(REFRESH_TOKEN_COOKIE) {
        let token = cookie.value();
        if !is_valid_jwt_format(token) {
            return Err(ApiError::InvalidArgument(
                "Invalid refresh token format".to_string(),
            ));
        }
        return Ok(token.to_string());
    }

    if body.is_empty() {
        return Err(ApiError::InvalidArgument(
            "Refresh token not provided".to_string(),
        ));
    }

    let request: RefreshRequest = serde_json::from_slice(body)
        .map_err(|_| ApiError::InvalidArgument("Invalid JSON body".to_string()))?;

    match request.refresh_token {
        Some(token) if is_valid_jwt_format(&token) => Ok(token),
        Some(_) => Err(ApiError::InvalidArgument(
            "Invalid refresh token format".to_string(),
        )),
        None => Err(ApiError::InvalidArgument(
            "Refresh token not provided".to_string(),
        )),
    }
}

fn claims_expiry(claims: &TokenClaims) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(claims.exp as i64, 0).unwrap_or_else(Utc::now)
}

// =============================================================================
// HANDLERS
// =============================================================================

/// POST /api/v1/auth/token - Issue the cookie pair for a known principal
pub async fn issue_token(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    jar: CookieJar,
    Json(request): Json<IssueTokenRequest>,
) -> Result<Response, ApiError> {
    rate_limit_guard(&state, "issue", &headers, &addr)?;

    if let Err(errors) = request.validate() {
        return Err(ApiError::InvalidArgument(validation_message(&errors)));
    }

    let provider = AuthProvider::from_str(&request.provider)
        .map_err(ApiError::InvalidArgument)?;

    let mut conn = state
        .diesel_pool
        .get()
        .await
        .map_err(|e| ApiError::DependencyUnavailable(e.to_string()))?;

    let user = User::find_by_provider(&mut conn, provider, &request.provider_id)
        .await
        .map_err(|e| match e {
            UserError::NotFound => ApiError::NotFound("complete federated sign-in first"),
            other => ApiError::from(other),
        })?;

    // Anti-hijack check: the presented email must match the stored principal.
    // The response reason stays generic to prevent account enumeration.
    if !emails_match(&request.email, &user.email) {
        warn!(
            user_id = %user.id,
            provider = %provider,
            "Token issuance email mismatch"
        );
        return Err(ApiError::Forbidden("invalid credentials"));
    }

    let (jar, tokens) = mint_token_pair(&state, &user.id.to_string(), &user.email, jar)?;

    Ok((StatusCode::OK, jar, Json(tokens)).into_response())
}

/// POST /api/v1/auth/refresh - Mint a fresh pair from a refresh token
pub async fn refresh_token(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    jar: CookieJar,
    body: Bytes,
) -> Result<Response, ApiError> {
    rate_limit_guard(&state, "refresh", &headers, &addr)?;

    let presented = extract_refresh_token(&jar, &body)?;
    let claims = state.jwt_service.parse(&presented).await?;

    if claims.token_type != TokenType::Refresh {
        return Err(ApiError::Unauthenticated("Not a refresh token"));
    }

    if let Some(jti) = &claims.jti {
        if revocation_verdict(&state, jti).await? {
            return Err(ApiError::Unauthenticated("token has been revoked"));
        }
    }

    let user_id = uuid::Uuid::parse_str(&claims.sub)
        .map_err(|_| ApiError::Unauthenticated("invalid credentials"))?;

    let mut conn = state
        .diesel_pool
        .get()
        .await
        .map_err(|e| ApiError::DependencyUnavailable(e.to_string()))?;

    let user = User::find_by_id(&mut conn, user_id).await.map_err(|e| match e {
        UserError::NotFound => ApiError::Unauthenticated("invalid credentials"),
        other => ApiError::from(other),
    })?;

    let (jar, tokens) = mint_token_pair(&state, &user.id.to_string(), &user.email, jar)?;

    // Operator-selected rotation policy: when enabled the presented refresh
    // token is revoked so only the newly minted one stays valid
    if state.config.jwt.rotate_refresh_tokens {
        if let Some(jti) = &claims.jti {
            let entry = NewTokenRevocation::new(
                jti.clone(),
                TokenType::Refresh,
                claims_expiry(&claims),
                "rotation",
            );
            if let Err(e) = state.revocation_store.revoke(entry).await {
                warn!(error = %e, "Failed to revoke rotated refresh token");
            }
        }
    }

    Ok((StatusCode::OK, jar, Json(tokens)).into_response())
}

/// POST /api/v1/auth/signin - Complete a federated sign-in
/// Verifies the provider's identity token, upserts the principal, and starts
/// a session. 201 when the principal was created, 200 on returning sign-ins.
pub async fn signin(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    jar: CookieJar,
    Json(request): Json<SigninRequest>,
) -> Result<Response, ApiError> {
    rate_limit_guard(&state, "signin", &headers, &addr)?;

    if let Err(errors) = request.validate() {
        return Err(ApiError::InvalidArgument(validation_message(&errors)));
    }

    let provider = AuthProvider::from_str(&request.provider)
        .map_err(ApiError::InvalidArgument)?;

    let identity = state
        .jwt_service
        .parse_identity_token(&request.id_token)
        .await?;

    let display_name = trim_optional_field(identity.name.as_ref())
        .unwrap_or_else(|| identity.email.split('@').next().unwrap_or("user").to_string());

    let profile = SigninProfile {
        email: identity.email.trim().to_lowercase(),
        display_name,
        avatar_url: trim_optional_field(identity.picture.as_ref()),
        provider,
        provider_id: identity.sub.clone(),
    };

    let mut conn = state
        .diesel_pool
        .get()
        .await
        .map_err(|e| ApiError::DependencyUnavailable(e.to_string()))?;

    let (user, created) = User::upsert_on_federated_signin(&mut conn, profile).await?;

    let (jar, tokens) = mint_token_pair(&state, &user.id.to_string(), &user.email, jar)?;

    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };

    let body = SigninResponse {
        user: UserView::from(user),
        created,
        tokens,
    };

    Ok((status, jar, Json(body)).into_response())
}

/// POST /api/v1/auth/logout - Revoke present tokens and clear cookies
/// Always succeeds; revocation failures are logged, never surfaced
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> Response {
    for name in [ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE] {
        let Some(cookie) = jar.get(name) else {
            continue;
        };

        match state.jwt_service.parse(cookie.value()).await {
            Ok(claims) => match &claims.jti {
                Some(jti) => {
                    let entry = NewTokenRevocation::new(
                        jti.clone(),
                        claims.token_type,
                        claims_expiry(&claims),
                        "logout",
                    );
                    if let Err(e) = state.revocation_store.revoke(entry).await {
                        warn!(error = %e, cookie = name, "Failed to revoke token on logout");
                    }
                },
                None => {
                    warn!(cookie = name, "Logout token carries no jti, nothing to revoke");
                },
            },
            Err(e) => {
                // Expired or unparseable tokens need no revocation
                tracing::debug!(error = %e, cookie = name, "Skipping revocation on logout");
            },
        }
    }

    let jar = jar
        .add(expired_cookie(ACCESS_TOKEN_COOKIE, &state.config))
        .add(expired_cookie(REFRESH_TOKEN_COOKIE, &state.config));

    (
        StatusCode::OK,
        jar,
        Json(LogoutResponse {
            message: "Logged out".to_string(),
        }),
    )
        .into_response()
}

/// POST /api/v1/auth/validate - Public token introspection
/// Validity is reported in the body; well-formed requests always get 200
pub async fn validate_token(
    State(state): State<AppState>,
    Json(request): Json<ValidateRequest>,
) -> Result<Json<ValidateResponse>, ApiError> {
    if request.token.trim().is_empty() {
        return Err(ApiError::InvalidArgument("Token is required".to_string()));
    }

    let claims = match state.jwt_service.parse(&request.token).await {
        Ok(claims) => claims,
        // Indeterminate validity still gets a 200; the outage detail stays
        // in the logs
        Err(JwtError::Key(KeyError::Unavailable(detail))) => {
            warn!(detail = %detail, "Key resolution unavailable during introspection");
            return Ok(Json(ValidateResponse {
                valid: false,
                claims: None,
                error: Some("verification keys unavailable".to_string()),
            }));
        },
        Err(err) => {
            return Ok(Json(ValidateResponse {
                valid: false,
                claims: None,
                error: Some(err.to_string()),
            }));
        },
    };

    if let Some(jti) = &claims.jti {
        match revocation_verdict(&state, jti).await {
            Ok(true) => {
                return Ok(Json(ValidateResponse {
                    valid: false,
                    claims: None,
                    error: Some("token has been revoked".to_string()),
                }));
            },
            Ok(false) => {},
            Err(_) => {
                return Ok(Json(ValidateResponse {
                    valid: false,
                    claims: None,
                    error: Some("revocation status unavailable".to_string()),
                }));
            },
        }
    }

    Ok(Json(ValidateResponse {
        valid: true,
        claims: Some(ClaimsView::from(&claims)),
        error: None,
    }))
}

/// GET /api/v1/auth/status - Authentication status for the caller
/// Runs behind the optional-auth layer; succeeds for anonymous callers too
pub async fn auth_status(MaybeUser(user): MaybeUser) -> Json<StatusResponse> {
    match user {
        Some(user) => Json(StatusResponse {
            authenticated: true,
            user: Some(StatusUser {
                id: user.user_id.clone(),
                email: user.email.clone(),
            }),
            token_info: Some(TokenInfo {
                jti: user.jti,
                expires_at: user.token_exp,
            }),
        }),
        None => Json(StatusResponse {
            authenticated: false,
            user: None,
            token_info: None,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emails_match_is_case_insensitive() {
        assert!(emails_match("Alice@Example.com", "alice@example.com"));
        assert!(!emails_match("attacker@example.com", "bob@example.com"));
        // Differing lengths never match
        assert!(!emails_match("a@example.com", "aa@example.com"));
    }

    #[test]
    fn test_jwt_format_check() {
        assert!(is_valid_jwt_format("a.b.c"));
        assert!(!is_valid_jwt_format("a.b"));
        assert!(!is_valid_jwt_format("a.b.c.d"));
    }
}
