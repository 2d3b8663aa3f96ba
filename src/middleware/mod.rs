// Middleware modules for the Bocchi backend

pub mod auth;
pub mod auth_middleware;

pub use auth::{AuthenticatedUser, MaybeUser, RequireAdmin};
pub use auth_middleware::{optional_auth, require_auth, revocation_verdict};
