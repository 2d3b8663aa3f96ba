// Auth cookie construction
// Every cookie the service sets is built here so the attribute set
// (HttpOnly, SameSite, Secure, domain) cannot drift across endpoints

use axum_extra::extract::cookie::{Cookie, SameSite};
use time::{Duration, OffsetDateTime};

use crate::app_config::AppConfig;

pub const ACCESS_TOKEN_COOKIE: &str = "bocchi_access_token";
pub const REFRESH_TOKEN_COOKIE: &str = "bocchi_refresh_token";

fn build(name: &'static str, value: String, config: &AppConfig) -> Cookie<'static> {
    let mut builder = Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .secure(config.is_production())
        .same_site(SameSite::Strict);

    if let Some(domain) = &config.cookies.domain {
        builder = builder.domain(domain.clone());
    }

    builder.build()
}

/// Access token cookie; expiry tracks the token's own expiry
pub fn access_token_cookie(token: String, max_age_secs: u64, config: &AppConfig) -> Cookie<'static> {
    let mut cookie = build(ACCESS_TOKEN_COOKIE, token, config);
    cookie.set_max_age(Duration::seconds(max_age_secs as i64));
    cookie
}

/// Refresh token cookie; expiry tracks the refresh token's expiry
pub fn refresh_token_cookie(
    token: String,
    max_age_secs: u64,
    config: &AppConfig,
) -> Cookie<'static> {
    let mut cookie = build(REFRESH_TOKEN_COOKIE, token, config);
    cookie.set_max_age(Duration::seconds(max_age_secs as i64));
    cookie
}

/// Expired form of an auth cookie; negative max_age plus a past expiry
/// instructs every client to discard it
pub fn expired_cookie(name: &'static str, config: &AppConfig) -> Cookie<'static> {
    let mut cookie = build(name, String::new(), config);
    cookie.set_max_age(Duration::seconds(-1));
    cookie.set_expires(OffsetDateTime::UNIX_EPOCH);
    cookie
}
