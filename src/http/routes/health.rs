//! GET /health - 探测各后端存储

use axum::{extract::State, http::StatusCode, response::Json};
use serde::Serialize;
use tracing::warn;

use crate::http::AppState;

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub database: &'static str,
    pub redis: &'static str,
}

fn probe_status(ok: Option<bool>) -> &'static str {
    match ok {
        None => "disabled",
        Some(true) => "ok",
        Some(false) => "unavailable",
    }
}

/// 任一已启用的存储不可用时返回 503
pub async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    let database = match &state.database {
        Some(db) => Some(match db.check_connection().await {
            Ok(()) => true,
            Err(e) => {
                warn!("⚠️ 健康检查: 数据库不可用: {}", e);
                false
            }
        }),
        None => None,
    };
    let redis = match &state.redis {
        Some(client) => Some(match client.ping().await {
            Ok(()) => true,
            Err(e) => {
                warn!("⚠️ 健康检查: Redis 不可用: {}", e);
                false
            }
        }),
        None => None,
    };

    let healthy = database != Some(false) && redis != Some(false);
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(HealthReport {
            status: if healthy { "ok" } else { "degraded" },
            database: probe_status(database),
            redis: probe_status(redis),
        }),
    )
}
