// Common test utilities and helper stores
// Shared across test files; none of them require a live database
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use bocchi_backend_core::{
    app_config::{
        AppConfig, CookieSettings, DatabaseConfig, Environment, JwtSettings, RateLimitSettings,
        RevocationSettings,
    },
    db::create_lazy_pool,
    models::NewTokenRevocation,
    AppState, JwtConfig, JwtService, KeyResolver, RateLimiter, RevocationError, RevocationStore,
};

pub const TEST_SECRET: &str = "test-signing-secret-hs256-minimum-32-characters";

/// Configuration for tests; no environment variables involved
pub fn test_config() -> AppConfig {
    AppConfig {
        bind_address: "127.0.0.1:0".to_string(),
        port: 0,
        environment: Environment::Test,
        cors_allowed_origins: vec![],
        admin_emails: vec!["admin@example.com".to_string()],
        database: DatabaseConfig {
            // Nothing listens here; tests must never reach the database
            url: "postgres://127.0.0.1:1/bocchi_test".to_string(),
            max_connections: 1,
            min_connections: 1,
            connect_timeout: 1,
            idle_timeout: 60,
            max_lifetime: 60,
        },
        jwt: JwtSettings {
            secret: TEST_SECRET.to_string(),
            jwks_url: None,
            issuer: Some("test.bocchi.example".to_string()),
            audience: Some("test.bocchi.example".to_string()),
            access_expiry: 86400,
            refresh_expiry: 604800,
            leeway: 30,
            rotate_refresh_tokens: false,
        },
        rate_limit: RateLimitSettings {
            enabled: true,
            limit: 5,
            window_seconds: 300,
        },
        cookies: CookieSettings { domain: None },
        revocation: RevocationSettings {
            fail_open: true,
            check_timeout_ms: 200,
            sweep_interval_seconds: 600,
        },
    }
}

/// Build app state around an injected revocation store
pub fn test_state(config: AppConfig, store: Arc<dyn RevocationStore>) -> AppState {
    let jwt_config = JwtConfig::from_secret(
        &config.jwt.secret,
        config.jwt.access_expiry,
        config.jwt.refresh_expiry,
        config.jwt.audience.clone(),
        config.jwt.issuer.clone(),
        config.jwt.leeway,
    );
    let keys = Arc::new(KeyResolver::static_secret(&config.jwt.secret));
    let rate_limiter = Arc::new(RateLimiter::new(
        config.rate_limit.limit,
        config.rate_limit.window_seconds,
    ));

    AppState {
        diesel_pool: create_lazy_pool(&config.database.url),
        jwt_service: Arc::new(JwtService::new(jwt_config, keys)),
        revocation_store: store,
        rate_limiter,
        config: Arc::new(config),
    }
}

/// In-memory store: revocations are recorded and queried like the real one
#[derive(Default)]
pub struct RecordingStore {
    revoked: Mutex<HashSet<String>>,
    reasons: Mutex<Vec<(String, String)>>,
}

impl RecordingStore {
    pub fn revoke_jti(&self, jti: &str) {
        self.revoked.lock().unwrap().insert(jti.to_string());
    }

    pub fn reasons(&self) -> Vec<(String, String)> {
        self.reasons.lock().unwrap().clone()
    }
}

#[async_trait]
impl RevocationStore for RecordingStore {
    async fn revoke(&self, entry: NewTokenRevocation) -> Result<(), RevocationError> {
        self.revoked.lock().unwrap().insert(entry.jti.clone());
        self.reasons.lock().unwrap().push((entry.jti, entry.reason));
        Ok(())
    }

    async fn is_revoked(&self, jti: &str) -> Result<bool, RevocationError> {
        Ok(self.revoked.lock().unwrap().contains(jti))
    }

    async fn sweep(&self, _now: DateTime<Utc>) -> Result<usize, RevocationError> {
        Ok(0)
    }
}

/// Store that is permanently down; exercises the unavailability policy
pub struct FailingStore;

#[async_trait]
impl RevocationStore for FailingStore {
    async fn revoke(&self, _entry: NewTokenRevocation) -> Result<(), RevocationError> {
        Err(RevocationError::Unavailable("injected outage".to_string()))
    }

    async fn is_revoked(&self, _jti: &str) -> Result<bool, RevocationError> {
        Err(RevocationError::Unavailable("injected outage".to_string()))
    }

    async fn sweep(&self, _now: DateTime<Utc>) -> Result<usize, RevocationError> {
        Err(RevocationError::Unavailable("injected outage".to_string()))
    }
}
