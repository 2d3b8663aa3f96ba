// Application state shared across handlers
use std::sync::Arc;

use crate::{
    app_config::AppConfig,
    db::DieselPool,
    services::{JwtService, RateLimiter, RevocationStore},
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub diesel_pool: DieselPool,
    pub jwt_service: Arc<JwtService>,
    pub revocation_store: Arc<dyn RevocationStore>,
    pub rate_limiter: Arc<RateLimiter>,
}
