// RedisClient - Redis客户端实现
// 基于 bb8-redis 连接池，撤销集合与阅读计数共用同一个池

use bb8::Pool;
use bb8_redis::RedisConnectionManager;
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::Duration;

use crate::config::RedisConfig;
use crate::error::{Result, ServerError};

/// Redis 客户端（基于连接池）
#[derive(Clone)]
pub struct RedisClient {
    pool: Arc<Pool<RedisConnectionManager>>,
    /// 单条 Redis 命令的执行超时（含取连接）
    command_timeout: Duration,
}

impl RedisClient {
    /// 创建新的 Redis 客户端（从 RedisConfig 配置）
    pub async fn new(config: &RedisConfig) -> Result<Self> {
        let manager = RedisConnectionManager::new(config.url.clone()).map_err(|e| {
            ServerError::Configuration(format!("Failed to create Redis manager: {}", e))
        })?;

        let pool = Pool::builder()
            .max_size(config.pool_size)
            .min_idle(Some(config.min_idle))
            .connection_timeout(config.connection_timeout())
            .idle_timeout(Some(config.idle_timeout()))
            .build(manager)
            .await
            .map_err(|e| ServerError::StoreUnavailable(format!("Failed to create Redis pool: {}", e)))?;

        let client = Self {
            pool: Arc::new(pool),
            command_timeout: config.command_timeout(),
        };

        // 测试连接
        client.ping().await?;

        tracing::info!(
            "✅ Redis 连接池已创建 (pool_size={}, min_idle={}, conn_timeout={}s, cmd_timeout={}ms, idle_timeout={}s)",
            config.pool_size,
            config.min_idle,
            config.connection_timeout_secs,
            config.command_timeout_ms,
            config.idle_timeout_secs,
        );

        Ok(client)
    }

    /// 获取连接池状态（活跃连接数、空闲连接数）
    pub fn pool_state(&self) -> bb8::State {
        self.pool.state()
    }

    /// 从连接池获取连接，连接在作用域结束时自动归还
    async fn get_conn(&self) -> Result<bb8::PooledConnection<'_, RedisConnectionManager>> {
        Ok(self.pool.get().await?)
    }

    /// 执行带超时的 Redis 操作
    async fn with_timeout<F, T>(&self, op: F) -> Result<T>
    where
        F: std::future::Future<Output = Result<T>>,
    {
        tokio::time::timeout(self.command_timeout, op)
            .await
            .map_err(|_| {
                ServerError::Timeout(format!(
                    "Redis command timeout ({}ms)",
                    self.command_timeout.as_millis()
                ))
            })?
    }

    /// PING
    pub async fn ping(&self) -> Result<()> {
        self.with_timeout(async {
            let mut conn = self.get_conn().await?;
            let _: String = redis::cmd("PING").query_async(&mut *conn).await?;
            Ok(())
        })
        .await
    }

    // ============================================================
    // Set 操作（撤销集合）
    // ============================================================

    /// SADD key member，返回是否为新成员
    pub async fn sadd(&self, key: &str, member: &str) -> Result<bool> {
        self.with_timeout(async {
            let mut conn = self.get_conn().await?;
            let added: i64 = conn.sadd(key, member).await?;
            Ok(added > 0)
        })
        .await
    }

    /// SISMEMBER key member
    pub async fn sismember(&self, key: &str, member: &str) -> Result<bool> {
        self.with_timeout(async {
            let mut conn = self.get_conn().await?;
            let present: bool = conn.sismember(key, member).await?;
            Ok(present)
        })
        .await
    }

    /// SREM key member，返回是否确实删除
    pub async fn srem(&self, key: &str, member: &str) -> Result<bool> {
        self.with_timeout(async {
            let mut conn = self.get_conn().await?;
            let removed: i64 = conn.srem(key, member).await?;
            Ok(removed > 0)
        })
        .await
    }

    /// SMEMBERS key
    pub async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        self.with_timeout(async {
            let mut conn = self.get_conn().await?;
            let members: Vec<String> = conn.smembers(key).await?;
            Ok(members)
        })
        .await
    }

    // ============================================================
    // 计数器操作（阅读计数）
    // ============================================================

    /// INCR key
    pub async fn incr(&self, key: &str) -> Result<i64> {
        self.with_timeout(async {
            let mut conn = self.get_conn().await?;
            let value: i64 = conn.incr(key, 1).await?;
            Ok(value)
        })
        .await
    }

    /// GET key（计数器读取）
    pub async fn get_i64(&self, key: &str) -> Result<Option<i64>> {
        self.with_timeout(async {
            let mut conn = self.get_conn().await?;
            let value: Option<i64> = conn.get(key).await?;
            Ok(value)
        })
        .await
    }

    /// TTL key：-2 表示 key 不存在，-1 表示没有过期时间
    pub async fn ttl(&self, key: &str) -> Result<i64> {
        self.with_timeout(async {
            let mut conn = self.get_conn().await?;
            let ttl: i64 = conn.ttl(key).await?;
            Ok(ttl)
        })
        .await
    }

    /// EXPIRE key seconds
    pub async fn expire(&self, key: &str, seconds: i64) -> Result<()> {
        self.with_timeout(async {
            let mut conn = self.get_conn().await?;
            conn.expire::<_, ()>(key, seconds).await?;
            Ok(())
        })
        .await
    }
}
