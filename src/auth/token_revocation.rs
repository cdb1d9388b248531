use async_trait::async_trait;
use dashmap::DashSet;
use tracing::{debug, info, warn};

use crate::auth::jwt_service::JwtService;
use crate::auth::models::TokenVerdict;
use crate::error::Result;
use crate::infra::redis::RedisClient;

/// Token 撤销集合
///
/// 整个部署共享一个集合（不按用户划分），成员是完整的 token 字符串。
/// 所有方法在后端不可用时返回 Err，由调用方执行 fail-closed。
#[async_trait]
pub trait RevocationStore: Send + Sync {
    /// 幂等加入集合，返回是否为新加入（并发撤销同一 token 时只有一方得到 true）
    async fn add(&self, token: &str) -> Result<bool>;

    /// 成员检查
    async fn contains(&self, token: &str) -> Result<bool>;

    /// 删除成员，返回是否确实存在
    async fn remove(&self, token: &str) -> Result<bool>;

    /// 当前全部成员（清理时使用）
    async fn members(&self) -> Result<Vec<String>>;

    /// 后端名称，用于日志
    fn backend(&self) -> &'static str;
}

/// 进程内撤销集合（降级模式，重启即丢失）
#[derive(Default)]
pub struct MemoryRevocationStore {
    tokens: DashSet<String>,
}

impl MemoryRevocationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl RevocationStore for MemoryRevocationStore {
    async fn add(&self, token: &str) -> Result<bool> {
        Ok(self.tokens.insert(token.to_string()))
    }

    async fn contains(&self, token: &str) -> Result<bool> {
        Ok(self.tokens.contains(token))
    }

    async fn remove(&self, token: &str) -> Result<bool> {
        Ok(self.tokens.remove(token).is_some())
    }

    async fn members(&self) -> Result<Vec<String>> {
        Ok(self.tokens.iter().map(|t| t.key().clone()).collect())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

/// Redis Set 撤销集合（跨进程共享，重启后仍然有效）
pub struct RedisRevocationStore {
    client: RedisClient,
    set_key: String,
}

impl RedisRevocationStore {
    pub fn new(client: RedisClient, set_key: impl Into<String>) -> Self {
        Self {
            client,
            set_key: set_key.into(),
        }
    }
}

#[async_trait]
impl RevocationStore for RedisRevocationStore {
    async fn add(&self, token: &str) -> Result<bool> {
        let added = self.client.sadd(&self.set_key, token).await?;
        if !added {
            debug!("token 已在撤销集合中 (key={})", self.set_key);
        }
        Ok(added)
    }

    async fn contains(&self, token: &str) -> Result<bool> {
        self.client.sismember(&self.set_key, token).await
    }

    async fn remove(&self, token: &str) -> Result<bool> {
        self.client.srem(&self.set_key, token).await
    }

    async fn members(&self) -> Result<Vec<String>> {
        self.client.smembers(&self.set_key).await
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}

/// 清理撤销集合中已自然过期的 token，返回 (删除数量, 剩余数量)
///
/// 只删除签名有效但已过期的成员；无法解析的成员保留在集合里。
/// 单个成员删除失败只记日志，不中断整轮清理。
pub async fn sweep_expired(store: &dyn RevocationStore, codec: &JwtService) -> Result<(usize, usize)> {
    let members = store.members().await?;
    let total = members.len();
    let mut removed = 0usize;

    for token in members {
        if let TokenVerdict::Expired(claims) = codec.inspect(&token) {
            match store.remove(&token).await {
                Ok(true) => {
                    removed += 1;
                    debug!("清理过期撤销条目: user={}, exp={}", claims.username, claims.exp);
                }
                Ok(false) => {}
                Err(e) => warn!("⚠️ 清理撤销条目失败 (backend={}): {}", store.backend(), e),
            }
        }
    }

    if removed > 0 {
        info!(
            "🧹 撤销集合清理完成: 删除 {} 个过期 token，剩余 {} (backend={})",
            removed,
            total - removed,
            store.backend()
        );
    }

    Ok((removed, total - removed))
}
