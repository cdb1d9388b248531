use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 服务器错误类型
///
/// 前四个变体对应核心的错误分类：未认证 / 未找到 / 冲突 / 存储不可用。
/// 调用方按变体区分，不需要匹配错误消息字符串。
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum ServerError {
    /// 缺失、无效、过期或已撤销的 token（统一为一类，不暴露原因）
    #[error("Unauthenticated")]
    Unauthenticated,
    /// 未知用户名、缺失的档案文档或帖子
    #[error("Not found: {0}")]
    NotFound(String),
    /// 重复点赞 / 重复订阅 / 用户已存在
    #[error("Conflict: {0}")]
    Conflict(String),
    /// 任一后端存储连接失败
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
    /// 请求参数校验失败
    #[error("Validation error: {0}")]
    Validation(String),
    /// 已认证但无权操作该资源
    #[error("Forbidden: {0}")]
    Forbidden(String),
    /// 存储调用超时
    #[error("Timeout: {0}")]
    Timeout(String),
    /// 配置错误
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// 内部错误
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// 是否属于后端不可用（超时也算），用于 fail-closed 判断和 503 响应
    pub fn is_store_failure(&self) -> bool {
        matches!(self, ServerError::StoreUnavailable(_) | ServerError::Timeout(_))
    }

    /// 面向客户端的消息：存储类与内部错误只返回通用文案，细节只进日志
    fn public_message(&self) -> String {
        match self {
            ServerError::StoreUnavailable(_) | ServerError::Timeout(_) => {
                "Service temporarily unavailable".to_string()
            }
            ServerError::Internal(_) | ServerError::Configuration(_) => {
                "Internal server error".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status_code = match &self {
            ServerError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::Conflict(_) => StatusCode::CONFLICT,
            ServerError::Validation(_) => StatusCode::BAD_REQUEST,
            ServerError::Forbidden(_) => StatusCode::FORBIDDEN,
            ServerError::StoreUnavailable(_) | ServerError::Timeout(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ServerError::Configuration(_) | ServerError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        if status_code.is_server_error() {
            tracing::error!("❌ 请求失败: {}", self);
        }

        let error_response = ErrorResponse::new(&self);
        (status_code, Json(error_response)).into_response()
    }
}

impl From<sqlx::Error> for ServerError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ServerError::NotFound("row not found".to_string()),
            sqlx::Error::PoolTimedOut => ServerError::Timeout("database pool timed out".to_string()),
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => ServerError::StoreUnavailable(format!("database: {}", err)),
            // 死锁 / 序列化失败是瞬时错误，可重试
            sqlx::Error::Database(ref db) if matches!(db.code().as_deref(), Some("40P01" | "40001")) => {
                ServerError::StoreUnavailable(format!("database: {}", err))
            }
            other => ServerError::Internal(format!("database: {}", other)),
        }
    }
}

impl From<redis::RedisError> for ServerError {
    fn from(err: redis::RedisError) -> Self {
        ServerError::StoreUnavailable(format!("redis: {}", err))
    }
}

impl From<bb8::RunError<redis::RedisError>> for ServerError {
    fn from(err: bb8::RunError<redis::RedisError>) -> Self {
        match err {
            bb8::RunError::TimedOut => ServerError::Timeout("redis pool timed out".to_string()),
            bb8::RunError::User(e) => e.into(),
        }
    }
}

impl From<opendal::Error> for ServerError {
    fn from(err: opendal::Error) -> Self {
        ServerError::StoreUnavailable(format!("object store: {}", err))
    }
}

impl From<serde_json::Error> for ServerError {
    fn from(err: serde_json::Error) -> Self {
        ServerError::Internal(format!("serialization: {}", err))
    }
}

impl From<tokio::time::error::Elapsed> for ServerError {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        ServerError::Timeout(err.to_string())
    }
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, ServerError>;

/// 错误代码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    Unauthenticated = 1001,
    NotFound = 1004,
    Conflict = 1009,
    Validation = 1003,
    Forbidden = 1006,
    StoreUnavailable = 5000,
    Timeout = 5002,
    Internal = 9000,
}

impl From<&ServerError> for ErrorCode {
    fn from(error: &ServerError) -> Self {
        match error {
            ServerError::Unauthenticated => ErrorCode::Unauthenticated,
            ServerError::NotFound(_) => ErrorCode::NotFound,
            ServerError::Conflict(_) => ErrorCode::Conflict,
            ServerError::Validation(_) => ErrorCode::Validation,
            ServerError::Forbidden(_) => ErrorCode::Forbidden,
            ServerError::StoreUnavailable(_) => ErrorCode::StoreUnavailable,
            ServerError::Timeout(_) => ErrorCode::Timeout,
            ServerError::Configuration(_) | ServerError::Internal(_) => ErrorCode::Internal,
        }
    }
}

/// 错误响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// 错误代码
    pub code: ErrorCode,
    /// 错误消息
    pub message: String,
    /// 时间戳
    pub timestamp: u64,
}

impl ErrorResponse {
    /// 创建错误响应
    pub fn new(error: &ServerError) -> Self {
        Self {
            code: ErrorCode::from(error),
            message: error.public_message(),
            timestamp: chrono::Utc::now().timestamp() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_failure_message_is_generic() {
        let err = ServerError::StoreUnavailable("redis: connection refused at 10.0.0.3".to_string());
        let resp = ErrorResponse::new(&err);
        assert_eq!(resp.code, ErrorCode::StoreUnavailable);
        assert!(!resp.message.contains("10.0.0.3"));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ServerError::Unauthenticated.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ServerError::Conflict("dup".into()).into_response().status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServerError::StoreUnavailable("down".into()).into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ServerError::NotFound("x".into()).into_response().status(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_unauthenticated_hides_cause() {
        assert_eq!(ServerError::Unauthenticated.to_string(), "Unauthenticated");
    }
}
