// Services module for the Bocchi backend
// Business logic layer for the authentication pipeline

pub mod jwt;
pub mod keys;
pub mod rate_limit;
pub mod revocation;

// Re-export commonly used services
pub use jwt::{JwtConfig, JwtError, JwtService};
pub use keys::{JwksCache, KeyError, KeyResolver};
pub use rate_limit::{RateLimitDecision, RateLimiter};
pub use revocation::{
    DieselRevocationStore, RevocationError, RevocationPolicy, RevocationStore,
};
