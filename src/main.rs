use axum::http::HeaderValue;
use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod config;
mod constants;
mod db;
mod error;
mod models;
mod services;
mod store;
mod utils;
mod websocket;

use config::Config;
use constants::API_VERSION;
use db::Database;
use services::{BattleEngine, NotificationService, RedisMatchmakingIndex};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "card_battle_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    config.validate()?;

    tracing::info!("Starting card battle backend");
    tracing::info!("Environment: {}", config.environment);
    tracing::info!("API Version: {}", API_VERSION);

    // Initialize database
    let db = Database::new(&config).await?;

    if utils::is_env_flag_enabled("SKIP_MIGRATIONS") {
        tracing::warn!("Database migrations skipped via SKIP_MIGRATIONS");
    } else {
        tracing::info!("Running database migrations...");
        db.run_migrations().await?;
    }

    // Initialize Redis
    let redis = redis::Client::open(config.redis_url.clone())?;
    let redis_manager = redis::aio::ConnectionManager::new(redis).await?;

    let notifications = Arc::new(NotificationService::new());
    let matchmaking = Arc::new(RedisMatchmakingIndex::new(
        redis_manager.clone(),
        config.matchmaking_cache_ttl_secs,
    ));
    let engine = Arc::new(BattleEngine::new(
        db.clone(),
        matchmaking,
        notifications.clone(),
        config.matchmaking_candidate_limit,
    ));

    let app_state = api::AppState {
        db: db.clone(),
        redis: redis_manager,
        config: config.clone(),
        engine,
        notifications,
    };

    // Build router
    let app = build_router(app_state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_router(state: api::AppState) -> Router {
    // CORS configuration
    let cors = cors_from_config(&state.config);

    Router::new()
        // Health check
        .route("/health", get(api::health::health_check))
        // Battles
        .route(
            "/api/v1/battles",
            get(api::battles::list_battles).post(api::battles::create_battle),
        )
        .route(
            "/api/v1/battles/quick-match",
            get(api::battles::quick_match),
        )
        .route("/api/v1/battles/{battle_id}", get(api::battles::get_battle))
        .route(
            "/api/v1/battles/{battle_id}/state",
            get(api::battles::get_battle_state),
        )
        .route(
            "/api/v1/battles/{battle_id}/join",
            post(api::battles::join_battle),
        )
        .route(
            "/api/v1/battles/{battle_id}/rounds",
            post(api::battles::play_round),
        )
        .route(
            "/api/v1/battles/{battle_id}/cancel",
            post(api::battles::cancel_battle),
        )
        // WebSocket
        .route("/ws/battles/{battle_id}", get(websocket::battles::handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_from_config(config: &Config) -> CorsLayer {
    let raw = config.cors_allowed_origins.trim();
    if raw.is_empty() || raw == "*" {
        if !config.is_development() {
            tracing::warn!("CORS allows any origin outside development");
        }
        return CorsLayer::very_permissive();
    }

    let allowed: Vec<HeaderValue> = raw
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<HeaderValue>().ok())
        .collect();

    if allowed.is_empty() {
        tracing::warn!("No valid CORS origins parsed; falling back to permissive");
        return CorsLayer::very_permissive();
    }

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(Any)
        .allow_headers(Any)
}

