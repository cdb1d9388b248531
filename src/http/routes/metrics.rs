//! GET /metrics - Prometheus 抓取端点

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};

use crate::http::AppState;
use crate::infra::metrics;

/// 抓取前刷新连接池 gauge；指标未初始化时返回 503
pub async fn metrics_handler(State(state): State<AppState>) -> Response {
    if let Some(db) = &state.database {
        let pool = db.pool();
        metrics::record_db_pool(pool.size(), pool.num_idle());
    }
    if let Some(redis) = &state.redis {
        let pool = redis.pool_state();
        metrics::record_redis_pool(pool.connections, pool.idle_connections);
    }

    match metrics::render_metrics() {
        Some(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics not initialized").into_response(),
    }
}
