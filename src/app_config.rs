// Centralized configuration management for the Bocchi backend
// Load ALL env vars ONCE at startup

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Global application configuration loaded once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(|| {
    // For tests, load .env file first
    #[cfg(test)]
    dotenv::dotenv().ok();

    AppConfig::from_env().expect("Failed to load configuration")
});

/// Accessor for the global configuration
pub fn config() -> &'static AppConfig {
    &CONFIG
}

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    // Server
    pub bind_address: String,
    pub port: u16,
    pub environment: Environment,

    // Security
    pub cors_allowed_origins: Vec<String>,

    /// Emails granted the admin capability at token mint time
    pub admin_emails: Vec<String>,

    // Nested sections
    pub database: DatabaseConfig,
    pub jwt: JwtSettings,
    pub rate_limit: RateLimitSettings,
    pub cookies: CookieSettings,
    pub revocation: RevocationSettings,
}

/// Environment type
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Environment {
    Development,
    Test,
    Staging,
    Production,
}

impl From<String> for Environment {
    fn from(s: String) -> Self {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Environment::Development,
            "test" => Environment::Test,
            "staging" | "stage" => Environment::Staging,
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Staging => write!(f, "staging"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: u64,
    pub idle_timeout: u64,
    pub max_lifetime: u64,
}

/// JWT configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtSettings {
    pub secret: String,
    /// When set, asymmetric federated tokens are verified against this key set
    pub jwks_url: Option<String>,
    pub issuer: Option<String>,
    pub audience: Option<String>,
    pub access_expiry: u64,
    pub refresh_expiry: u64,
    pub leeway: u64,
    /// Revoke the old refresh token on each refresh (operator policy)
    pub rotate_refresh_tokens: bool,
}

/// Rate limiting for credential-issuing endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSettings {
    pub enabled: bool,
    pub limit: u64,
    pub window_seconds: u64,
}

/// Cookie attributes shared by every auth cookie
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CookieSettings {
    pub domain: Option<String>,
}

/// Revocation store behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevocationSettings {
    /// Treat an unavailable store as "not revoked" (availability over security)
    pub fail_open: bool,
    /// Soft budget for the per-request revocation lookup
    pub check_timeout_ms: u64,
    /// Interval of the background sweep job
    pub sweep_interval_seconds: u64,
}

impl AppConfig {
    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let get_required = |key: &str| -> Result<String, ConfigError> {
            env::var(key).map_err(|_| ConfigError::MissingVar(key.to_string()))
        };

        let get_or_default = |key: &str, default: &str| -> String {
            env::var(key).unwrap_or_else(|_| default.to_string())
        };

        let parse_u64_or_default = |key: &str, default: &str| -> Result<u64, ConfigError> {
            get_or_default(key, default).parse().map_err(|_| {
                ConfigError::InvalidValue(key.to_string(), "not a valid u64".to_string())
            })
        };

        let parse_u32_or_default = |key: &str, default: &str| -> Result<u32, ConfigError> {
            get_or_default(key, default).parse().map_err(|_| {
                ConfigError::InvalidValue(key.to_string(), "not a valid u32".to_string())
            })
        };

        let parse_bool_or_default = |key: &str, default: &str| -> bool {
            get_or_default(key, default).to_lowercase() == "true"
        };

        let parse_list = |key: &str| -> Vec<String> {
            get_or_default(key, "")
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        };

        let bind_address = get_or_default("BIND_ADDRESS", "0.0.0.0:8080");
        let port = bind_address
            .rsplit(':')
            .next()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);

        let jwt_secret = get_required("JWT_SECRET")?;
        if jwt_secret.len() < 32 {
            return Err(ConfigError::InvalidValue(
                "JWT_SECRET".to_string(),
                "must be at least 32 bytes".to_string(),
            ));
        }

        let access_expiry = parse_u64_or_default("JWT_ACCESS_EXPIRY", "86400")?;
        let refresh_expiry = parse_u64_or_default("JWT_REFRESH_EXPIRY", "604800")?;
        if access_expiry >= refresh_expiry {
            return Err(ConfigError::InvalidValue(
                "JWT_ACCESS_EXPIRY".to_string(),
                "access token lifetime must be shorter than refresh token lifetime".to_string(),
            ));
        }

        Ok(AppConfig {
            bind_address,
            port,
            environment: Environment::from(get_or_default("ENVIRONMENT", "development")),
            cors_allowed_origins: parse_list("CORS_ALLOWED_ORIGINS"),
            admin_emails: parse_list("ADMIN_EMAILS"),
            database: DatabaseConfig {
                url: get_required("DATABASE_URL")?,
                max_connections: parse_u32_or_default("DATABASE_MAX_CONNECTIONS", "10")?,
                min_connections: parse_u32_or_default("DATABASE_MIN_CONNECTIONS", "1")?,
                connect_timeout: parse_u64_or_default("DATABASE_CONNECT_TIMEOUT", "30")?,
                idle_timeout: parse_u64_or_default("DATABASE_IDLE_TIMEOUT", "600")?,
                max_lifetime: parse_u64_or_default("DATABASE_MAX_LIFETIME", "1800")?,
            },
            jwt: JwtSettings {
                secret: jwt_secret,
                jwks_url: env::var("JWKS_URL").ok().filter(|s| !s.is_empty()),
                issuer: env::var("JWT_ISSUER").ok().filter(|s| !s.is_empty()),
                audience: env::var("JWT_AUDIENCE").ok().filter(|s| !s.is_empty()),
                access_expiry,
                refresh_expiry,
                leeway: parse_u64_or_default("JWT_LEEWAY", "30")?,
                rotate_refresh_tokens: parse_bool_or_default("JWT_ROTATE_REFRESH_TOKENS", "false"),
            },
            rate_limit: RateLimitSettings {
                enabled: parse_bool_or_default("RATE_LIMIT_ENABLED", "true"),
                limit: parse_u64_or_default("RATE_LIMIT_REQUESTS", "5")?,
                window_seconds: parse_u64_or_default("RATE_LIMIT_WINDOW_SECONDS", "300")?,
            },
            cookies: CookieSettings {
                domain: env::var("COOKIE_DOMAIN").ok().filter(|s| !s.is_empty()),
            },
            revocation: RevocationSettings {
                fail_open: parse_bool_or_default("REVOCATION_FAIL_OPEN", "true"),
                check_timeout_ms: parse_u64_or_default("REVOCATION_CHECK_TIMEOUT_MS", "200")?,
                sweep_interval_seconds: parse_u64_or_default("REVOCATION_SWEEP_INTERVAL", "600")?,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_parses_aliases() {
        assert_eq!(Environment::from("prod".to_string()), Environment::Production);
        assert_eq!(Environment::from("dev".to_string()), Environment::Development);
        assert_eq!(
            Environment::from("unknown".to_string()),
            Environment::Development
        );
    }
}
