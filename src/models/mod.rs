pub mod auth;
pub mod revocation;
pub mod user;

// Re-export common types
pub use auth::{IdentityClaims, TokenClaims, TokenType};
pub use revocation::{NewTokenRevocation, TokenRevocation};
pub use user::{
    AuthProvider, DeletionReport, NewUser, Preferences, SigninProfile, User, UserError,
    UserProfileChanges,
};
