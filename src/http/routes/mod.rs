//! HTTP 路由
//!
//! 各模块提供 `create_route()`，在这里合并。

pub mod auth;
pub mod health;
pub mod history;
pub mod media;
pub mod metrics;
pub mod posts;
pub mod user;

use axum::{routing::get, Router};

use crate::http::AppState;

/// 创建所有路由
pub fn create_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/metrics", get(metrics::metrics_handler))
        .merge(auth::create_route())
        .merge(posts::create_route())
        .merge(media::create_route())
        .merge(history::create_route())
        .merge(user::create_route())
}
