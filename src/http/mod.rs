//! HTTP 接口层 - axum 路由，业务逻辑全部委托给服务层
//!
//! - `/auth/*`     注册、登录、登出、续期
//! - `/posts/*`    帖子、评论、媒体上传
//! - `/history/*`  阅读记录与点赞
//! - `/user/*`     订阅与用户信息
//! - `/health`、`/metrics`

pub mod middleware;
pub mod routes;
pub mod server;

pub use server::{build_router, AppState};
