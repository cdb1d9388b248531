//! 计数缓存：带时间窗口的临时计数器（阅读数）
//!
//! 非权威数据，可丢失、可重建，到期自动清除，从不递减。

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::auth::clock::{Clock, SystemClock};
use crate::error::Result;
use crate::infra::metrics;
use crate::infra::redis::RedisClient;

/// key 不存在
pub const TTL_MISSING: i64 = -2;
/// key 存在但没有过期时间
pub const TTL_PERSISTENT: i64 = -1;

/// 计数缓存接口（语义与 Redis INCR / TTL / EXPIRE 一致）
#[async_trait]
pub trait CounterCache: Send + Sync {
    /// 原子加一，返回加后的值；key 不存在时从 0 开始
    async fn increment(&self, key: &str) -> Result<i64>;

    /// 剩余秒数；`TTL_MISSING` / `TTL_PERSISTENT` 含义同 Redis
    async fn get_ttl(&self, key: &str) -> Result<i64>;

    /// 设置过期时间（秒）
    async fn set_expiry(&self, key: &str, seconds: i64) -> Result<()>;

    /// 当前值
    async fn get(&self, key: &str) -> Result<Option<i64>>;
}

/// Redis 计数缓存
pub struct RedisCounterCache {
    client: RedisClient,
}

impl RedisCounterCache {
    pub fn new(client: RedisClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CounterCache for RedisCounterCache {
    async fn increment(&self, key: &str) -> Result<i64> {
        self.client.incr(key).await
    }

    async fn get_ttl(&self, key: &str) -> Result<i64> {
        self.client.ttl(key).await
    }

    async fn set_expiry(&self, key: &str, seconds: i64) -> Result<()> {
        self.client.expire(key, seconds).await
    }

    async fn get(&self, key: &str) -> Result<Option<i64>> {
        self.client.get_i64(key).await
    }
}

#[derive(Debug, Clone, Copy)]
struct CounterEntry {
    value: i64,
    /// 过期时刻（Unix 秒），None 表示不过期
    expires_at: Option<i64>,
}

/// 进程内计数缓存（开发模式与测试使用）
pub struct MemoryCounterCache {
    entries: DashMap<String, CounterEntry>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryCounterCache {
    fn default() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }
}

impl MemoryCounterCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    /// 惰性过期：访问时发现到期就删除
    fn evict_if_expired(&self, key: &str) {
        let now = self.clock.now();
        self.entries
            .remove_if(key, |_, entry| entry.expires_at.is_some_and(|at| at <= now));
    }
}

#[async_trait]
impl CounterCache for MemoryCounterCache {
    async fn increment(&self, key: &str) -> Result<i64> {
        self.evict_if_expired(key);
        let mut entry = self.entries.entry(key.to_string()).or_insert(CounterEntry {
            value: 0,
            expires_at: None,
        });
        entry.value += 1;
        Ok(entry.value)
    }

    async fn get_ttl(&self, key: &str) -> Result<i64> {
        self.evict_if_expired(key);
        let now = self.clock.now();
        Ok(match self.entries.get(key) {
            None => TTL_MISSING,
            Some(entry) => match entry.expires_at {
                None => TTL_PERSISTENT,
                Some(at) => at - now,
            },
        })
    }

    async fn set_expiry(&self, key: &str, seconds: i64) -> Result<()> {
        let deadline = self.clock.now().saturating_add(seconds);
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.expires_at = Some(deadline);
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<i64>> {
        self.evict_if_expired(key);
        Ok(self.entries.get(key).map(|entry| entry.value))
    }
}

/// 帖子阅读计数
///
/// 窗口内第一次计数（或 key 没有过期时间）时设置过期，窗口结束后自动归零。
/// 对主请求是尽力而为：后台执行，失败只记录日志。
pub struct ReadCounter {
    cache: Arc<dyn CounterCache>,
    window_secs: i64,
}

impl ReadCounter {
    pub fn new(cache: Arc<dyn CounterCache>, window_secs: i64) -> Self {
        Self { cache, window_secs }
    }

    pub fn key(post_id: &str) -> String {
        format!("post:read:{}", post_id)
    }

    /// 计数一次，返回窗口内的阅读数
    pub async fn record(&self, post_id: &str) -> Result<i64> {
        let key = Self::key(post_id);
        let count = self.cache.increment(&key).await?;
        if count == 1 || self.cache.get_ttl(&key).await? == TTL_PERSISTENT {
            self.cache.set_expiry(&key, self.window_secs).await?;
        }
        Ok(count)
    }

    /// 后台计数，不阻塞调用方，失败不影响调用方
    pub fn record_detached(self: &Arc<Self>, post_id: String) {
        let counter = Arc::clone(self);
        tokio::spawn(async move {
            match counter.record(&post_id).await {
                Ok(count) => debug!("阅读计数: post={}, count={}", post_id, count),
                Err(e) => {
                    metrics::record_read_counter_failure();
                    warn!("⚠️ 阅读计数失败 (post={}): {}", post_id, e);
                }
            }
        });
    }

    /// 当前窗口内的阅读数（未计数时为 0）
    pub async fn count(&self, post_id: &str) -> Result<i64> {
        Ok(self.cache.get(&Self::key(post_id)).await?.unwrap_or(0))
    }
}
