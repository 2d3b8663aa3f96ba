// Utility modules for the Bocchi backend

pub mod auth_errors;
pub mod client_ip;
pub mod cookies;
pub mod validation;

pub use auth_errors::{log_account_deletion, ApiError, ErrorBody};
pub use client_ip::client_ip;
pub use cookies::{
    access_token_cookie, expired_cookie, refresh_token_cookie, ACCESS_TOKEN_COOKIE,
    REFRESH_TOKEN_COOKIE,
};
pub use validation::{trim_and_validate_field, trim_optional_field};
