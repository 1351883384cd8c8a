use axum::{routing::get, Router};
use tower_http::cors::{Any, CorsLayer};

use crate::api::{handlers, state::AppState};

pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Market endpoints
        .route("/api/markets", get(handlers::list_markets))
        .route("/api/markets/:id", get(handlers::get_market))
        .route("/api/markets/:id/outcomes", get(handlers::get_market_outcomes))
        .route("/api/markets/:id/trades", get(handlers::get_market_trades))
        // User endpoints
        .route("/api/users/:address", get(handlers::get_user))
        .route("/api/leaderboard/volume", get(handlers::top_traders_by_volume))
        .route("/api/leaderboard/pnl", get(handlers::top_traders_by_pnl))
        // Trade and stats endpoints
        .route("/api/trades", get(handlers::get_trades))
        .route("/api/stats", get(handlers::get_global_stats))
        // System endpoints
        .route("/health", get(handlers::health_handler))
        .route("/metrics", get(handlers::metrics_handler))
        // Add state and CORS
        .with_state(state)
        .layer(cors)
}
