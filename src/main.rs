use axum::{
    http::{header, Method},
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::time::Duration;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bocchi_backend_core::{
    app_config,
    db::{create_diesel_pool, mask_connection_string, run_migrations, DieselDatabaseConfig},
    handlers, AppConfig, AppState,
};

/// Deadline for credential endpoints; a hung upstream must not hold a worker
const CREDENTIAL_ENDPOINT_DEADLINE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Handle version flag for container health checks - must be FIRST
    let args: Vec<String> = std::env::args().collect();
    if args.len() > 1 && args[1] == "--version" {
        println!("bocchi-backend v{}", env!("CARGO_PKG_VERSION"));
        std::process::exit(0);
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bocchi_backend_core=debug,axum=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize centralized config (loads all env vars ONCE)
    let config = app_config::config().clone();
    let bind_address = config.bind_address.clone();
    info!("Starting Bocchi backend on {}", bind_address);

    // Initialize database pool
    info!("Initializing database pool...");
    info!(
        "Database URL: {}",
        mask_connection_string(&config.database.url)
    );
    let pool_config = DieselDatabaseConfig::from_app_config(&config);
    let diesel_pool = match create_diesel_pool(pool_config).await {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to initialize database pool: {}", e);
            return Err(anyhow::anyhow!("Database initialization failed: {}", e));
        },
    };

    // Apply pending migrations
    run_migrations(&config.database.url)
        .await
        .map_err(|e| anyhow::anyhow!("Migration failed: {}", e))?;

    if config.jwt.jwks_url.is_some() {
        info!("Key resolver: JWKS endpoint configured, federated signatures accepted");
    } else {
        info!("Key resolver: static shared secret only");
    }
    info!(
        "Revocation store policy: {}",
        if config.revocation.fail_open {
            "fail open"
        } else {
            "fail closed"
        }
    );

    let state = bocchi_backend_core::build_state(config.clone(), diesel_pool);

    spawn_revocation_sweeper(&state);

    let app = build_router(&config, state.clone()).with_state(state);

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    info!("Listening on {}", listener.local_addr()?);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

fn build_router(config: &AppConfig, state: AppState) -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health_check))
        .nest(
            "/api/v1/auth",
            handlers::auth_routes(state.clone())
                .layer(TimeoutLayer::new(CREDENTIAL_ENDPOINT_DEADLINE)),
        )
        .nest("/api/v1/users", handlers::user_routes(state.clone()))
        .nest("/api/v1/admin", handlers::admin_routes(state))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(config))
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let has_wildcard = config.cors_allowed_origins.iter().any(|o| o == "*");

    // Wildcard with credentials is only honored outside production, where
    // the requesting origin is reflected back
    let origin = if has_wildcard && !config.is_production() {
        AllowOrigin::mirror_request()
    } else {
        AllowOrigin::list(
            config
                .cors_allowed_origins
                .iter()
                .filter(|o| o.as_str() != "*")
                .filter_map(|o| o.parse().ok()),
        )
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}

/// Out-of-band eviction of expired revocation entries; authorization
/// correctness never depends on its timing
fn spawn_revocation_sweeper(state: &AppState) {
    let store = state.revocation_store.clone();
    let interval = Duration::from_secs(state.config.revocation.sweep_interval_seconds.max(1));

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = store.sweep(chrono::Utc::now()).await {
                warn!(error = %e, "Revocation sweep failed");
            }
        }
    });
}
