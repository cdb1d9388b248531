// Infrastructure layer - 基础设施层
// 负责外部存储的连接与访问：PostgreSQL、Redis、计数缓存、指标

use std::future::Future;
use std::time::Duration;

use crate::error::{Result, ServerError};

pub mod counter_cache;
pub mod database;
pub mod metrics;
pub mod redis;

pub use counter_cache::{CounterCache, MemoryCounterCache, ReadCounter, RedisCounterCache};
pub use database::Database;
pub use redis::RedisClient;

/// 给单次存储调用加超时，超时后返回 `ServerError::Timeout`
///
/// 存储卡住时请求不会一直占用处理线程。
pub async fn with_store_timeout<F, T>(timeout: Duration, op: &'static str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(ServerError::Timeout(format!(
            "{} 超时 ({}ms)",
            op,
            timeout.as_millis()
        ))),
    }
}
