use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};

use crate::api::{state::AppState, types::*};

/// GET /health -- liveness probe; degraded when the store cannot be read
pub async fn health_handler(
    State(state): State<AppState>,
) -> std::result::Result<Json<HealthResponse>, (StatusCode, Json<HealthResponse>)> {
    let head_block = state.metrics.head_block();
    let watermark = state.api.get_watermark().await;
    let ok = watermark.is_ok();
    let watermark = watermark.ok().flatten();

    let resp = HealthResponse {
        status: if ok {
            "ok".to_string()
        } else {
            "degraded".to_string()
        },
        uptime_seconds: state.uptime_seconds(),
        watermark,
        head_block,
        lag_blocks: head_block.saturating_sub(watermark.map_or(0, |w| w.block_number)),
    };

    if ok {
        Ok(Json(resp))
    } else {
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(resp)))
    }
}

/// GET /metrics -- Prometheus text exposition
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.prometheus(),
    )
}
