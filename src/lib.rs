//! 社交博客后端
//!
//! 身份（用户名、邮箱、密码哈希）存关系表，社交档案与帖子存 JSONB 文档，
//! 阅读计数与 token 撤销集合存 Redis。请求先校验 token，再把用户名解析为数字 ID，
//! 之后的所有写操作都以数字 ID 为键。

pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod http;
pub mod infra;
pub mod logging;
pub mod model;
pub mod repository;
pub mod server;
pub mod service;

pub use config::ServerConfig;
pub use error::{Result, ServerError};
pub use server::BlogServer;
