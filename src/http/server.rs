//! HTTP 路由装配与共享状态

use axum::Router;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::http::routes;
use crate::infra::{Database, RedisClient};
use crate::service::{AuthService, MediaService, PostService, SocialService};

/// 路由共享状态
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub posts: Arc<PostService>,
    pub social: Arc<SocialService>,
    pub media: Arc<MediaService>,
    /// 健康检查探测的后端，内存模式下为空
    pub database: Option<Database>,
    pub redis: Option<RedisClient>,
}

/// 构建完整路由
///
/// `static_root` 为本地媒体目录时挂载 `/static`，返回的 media_url 可直接访问。
pub fn build_router(state: AppState, static_root: Option<PathBuf>) -> Router {
    let mut router = routes::create_routes();
    if let Some(root) = static_root {
        router = router.nest_service("/static", ServeDir::new(root));
    }

    router
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
