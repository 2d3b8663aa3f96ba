// Library exports for the Bocchi backend
// This file exposes modules and functions for library consumers

pub mod app;
pub mod app_config;
pub mod db;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod schema;
pub mod services;
pub mod utils;

// Re-export commonly used types
pub use app::AppState;
pub use app_config::{AppConfig, CONFIG};
pub use db::{DieselDatabaseConfig, DieselPool};
pub use middleware::{optional_auth, require_auth, AuthenticatedUser, RequireAdmin};
pub use models::auth::{TokenClaims, TokenType};
pub use models::user::{AuthProvider, Preferences, SigninProfile, User, UserError};
pub use services::{
    DieselRevocationStore, JwtConfig, JwtError, JwtService, KeyError, KeyResolver,
    RateLimitDecision, RateLimiter, RevocationError, RevocationPolicy, RevocationStore,
};
pub use utils::{ApiError, ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE};

// Re-export route builders
pub use handlers::{admin_routes, auth_routes, user_routes};

use std::sync::Arc;

/// Select the verification key path once at startup: a configured JWKS URL
/// activates the federated resolver, otherwise only the shared secret verifies
pub fn build_key_resolver(settings: &app_config::JwtSettings) -> KeyResolver {
    match &settings.jwks_url {
        Some(url) => KeyResolver::with_jwks(&settings.secret, url),
        None => KeyResolver::static_secret(&settings.secret),
    }
}

/// Assemble the shared application state from configuration and a pool
pub fn build_state(config: AppConfig, diesel_pool: DieselPool) -> AppState {
    let keys = Arc::new(build_key_resolver(&config.jwt));
    let jwt_service = Arc::new(JwtService::new(JwtConfig::from_settings(&config.jwt), keys));
    let revocation_store: Arc<dyn RevocationStore> =
        Arc::new(DieselRevocationStore::new(diesel_pool.clone()));
    let rate_limiter = Arc::new(RateLimiter::new(
        config.rate_limit.limit,
        config.rate_limit.window_seconds,
    ));

    AppState {
        config: Arc::new(config),
        diesel_pool,
        jwt_service,
        revocation_store,
        rate_limiter,
    }
}

/// Initialize state for external consumers: config, pool, migrations
pub async fn initialize_app_state() -> Result<AppState, Box<dyn std::error::Error + Send + Sync>> {
    dotenv::dotenv().ok();

    let config = app_config::config().clone();

    tracing::info!(
        "Database URL: {}",
        db::mask_connection_string(&config.database.url)
    );
    let pool_config = DieselDatabaseConfig::from_app_config(&config);
    let diesel_pool = db::create_diesel_pool(pool_config).await?;

    db::run_migrations(&config.database.url).await?;

    Ok(build_state(config, diesel_pool))
}
