use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::auth::jwt_service::JwtService;
use crate::auth::models::{TokenClaims, TokenPayload};
use crate::auth::token_revocation::{sweep_expired, RevocationStore};
use crate::error::{Result, ServerError};
use crate::infra::metrics;

/// 会话管理器：签发、校验、撤销、续期
///
/// 状态按 token 划分（不按用户）：
/// - Active：签名正确、未过期、不在撤销集合中
/// - Expired：签名正确但已过期，编解码层直接拒绝，不查撤销集合
/// - Revoked：在撤销集合中，无论签名与过期时间如何都拒绝
/// - Invalid：格式错误或签名不匹配
///
/// 撤销存储在构造时注入，不使用全局共享状态。
pub struct SessionManager {
    codec: Arc<JwtService>,
    revocations: Arc<dyn RevocationStore>,
    default_ttl: i64,
}

impl SessionManager {
    pub fn new(codec: Arc<JwtService>, revocations: Arc<dyn RevocationStore>, default_ttl: i64) -> Self {
        Self {
            codec,
            revocations,
            default_ttl,
        }
    }

    pub fn codec(&self) -> &JwtService {
        &self.codec
    }

    pub fn default_ttl(&self) -> i64 {
        self.default_ttl
    }

    /// 签发 token
    pub fn generate_token(&self, payload: &TokenPayload, ttl: i64) -> Result<String> {
        let token = self.codec.issue(payload, ttl)?;
        metrics::record_token_issued();
        debug!("签发 token: user={}, ttl={}s", payload.username, ttl);
        Ok(token)
    }

    /// 按默认有效期签发
    pub fn generate_default_token(&self, payload: &TokenPayload) -> Result<String> {
        self.generate_token(payload, self.default_ttl)
    }

    /// 校验 token，只有 Active 状态返回 claims
    ///
    /// 过期、撤销、无效统一返回 None，调用方不应区分原因。
    /// 撤销集合不可访问时按已撤销处理（fail-closed）。
    pub async fn check_token(&self, token: &str) -> Option<TokenClaims> {
        let Some(claims) = self.codec.verify(token) else {
            metrics::record_token_rejected("invalid_or_expired");
            return None;
        };

        match self.revocations.contains(token).await {
            Ok(false) => Some(claims),
            Ok(true) => {
                metrics::record_token_rejected("revoked");
                debug!("token 已撤销: user={}", claims.username);
                None
            }
            Err(e) => {
                metrics::record_revocation_store_error("contains");
                metrics::record_token_rejected("revocation_unavailable");
                warn!(
                    "⚠️ 撤销集合不可用，按未认证处理 (backend={}, user={}): {}",
                    self.revocations.backend(),
                    claims.username,
                    e
                );
                None
            }
        }
    }

    /// 撤销 token（幂等）
    ///
    /// 撤销集合写入失败时返回 StoreUnavailable，调用方应视为登出未完成。
    pub async fn blacklist_token(&self, token: &str) -> Result<()> {
        self.revoke(token).await.map(|_| ())
    }

    /// 写入撤销集合，返回是否由本次调用加入
    async fn revoke(&self, token: &str) -> Result<bool> {
        let added = self.revocations.add(token).await.map_err(|e| {
            metrics::record_revocation_store_error("add");
            warn!(
                "⚠️ token 撤销失败 (backend={}): {}",
                self.revocations.backend(),
                e
            );
            match e {
                ServerError::StoreUnavailable(_) | ServerError::Timeout(_) => e,
                other => ServerError::StoreUnavailable(other.to_string()),
            }
        })?;
        if added {
            metrics::record_token_revoked();
        }
        Ok(added)
    }

    /// 续期：校验旧 token → 用相同载荷签发新 token → 撤销旧 token
    ///
    /// 同一 token 的并发续期只有撤销写入成功的一方拿到新 token，其余返回 Unauthenticated。
    /// 不是原子事务。旧 token 撤销失败时两个 token 都有效直到旧 token 自然过期，
    /// 这里只记录告警，不回滚新 token。
    pub async fn renew(&self, token: &str, ttl: Option<i64>) -> Result<String> {
        let claims = self
            .check_token(token)
            .await
            .ok_or(ServerError::Unauthenticated)?;

        let new_token = self.generate_token(&claims.payload(), ttl.unwrap_or(self.default_ttl))?;

        match self.revoke(token).await {
            Ok(true) => {}
            Ok(false) => {
                metrics::record_token_rejected("revoked");
                warn!("⚠️ 旧 token 已被并发请求撤销，拒绝续期 (user={})", claims.username);
                return Err(ServerError::Unauthenticated);
            }
            Err(e) => warn!(
                "⚠️ 续期后旧 token 撤销失败，旧 token 将保持有效至 exp={} (user={}): {}",
                claims.exp, claims.username, e
            ),
        }

        metrics::record_token_renewed();
        info!("🔄 token 已续期: user={}", claims.username);
        Ok(new_token)
    }

    /// 清理撤销集合中已过期的 token，返回删除数量
    pub async fn remove_expired_tokens(&self) -> Result<usize> {
        let (removed, remaining) = sweep_expired(self.revocations.as_ref(), &self.codec).await?;
        metrics::record_sweep(removed, remaining);
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::clock::ManualClock;
    use crate::auth::token_revocation::MemoryRevocationStore;
    use async_trait::async_trait;

    const SECRET: &str = "session-secret-session-secret-32";

    fn manager() -> (SessionManager, Arc<ManualClock>, Arc<MemoryRevocationStore>) {
        let clock = Arc::new(ManualClock::new(1_700_000_000));
        let codec = Arc::new(JwtService::with_clock(SECRET, clock.clone()));
        let store = Arc::new(MemoryRevocationStore::new());
        (SessionManager::new(codec, store.clone(), 3600), clock, store)
    }

    /// 永远不可用的撤销存储
    struct DownStore;

    #[async_trait]
    impl RevocationStore for DownStore {
        async fn add(&self, _token: &str) -> Result<bool> {
            Err(ServerError::StoreUnavailable("connection refused".into()))
        }
        async fn contains(&self, _token: &str) -> Result<bool> {
            Err(ServerError::StoreUnavailable("connection refused".into()))
        }
        async fn remove(&self, _token: &str) -> Result<bool> {
            Err(ServerError::StoreUnavailable("connection refused".into()))
        }
        async fn members(&self) -> Result<Vec<String>> {
            Err(ServerError::StoreUnavailable("connection refused".into()))
        }
        fn backend(&self) -> &'static str {
            "down"
        }
    }

    #[tokio::test]
    async fn test_issue_then_check() {
        let (sessions, _, _) = manager();
        let token = sessions
            .generate_token(&TokenPayload::for_user("alice"), 3600)
            .unwrap();
        let claims = sessions.check_token(&token).await.unwrap();
        assert_eq!(claims.username, "alice");
    }

    #[tokio::test]
    async fn test_revoked_token_rejected_while_still_valid() {
        let (sessions, _, store) = manager();
        let token = sessions.generate_default_token(&TokenPayload::for_user("alice")).unwrap();

        sessions.blacklist_token(&token).await.unwrap();
        sessions.blacklist_token(&token).await.unwrap();

        assert!(sessions.codec().verify(&token).is_some());
        assert!(sessions.check_token(&token).await.is_none());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_renew_rotates_token() {
        let (sessions, _, _) = manager();
        let old = sessions.generate_default_token(&TokenPayload::for_user("alice")).unwrap();

        let new = sessions.renew(&old, None).await.unwrap();

        assert_ne!(old, new);
        assert!(sessions.check_token(&old).await.is_none());
        assert_eq!(sessions.check_token(&new).await.unwrap().username, "alice");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_renew_single_winner() {
        let (sessions, _, _) = manager();
        let sessions = Arc::new(sessions);
        let old = sessions.generate_default_token(&TokenPayload::for_user("alice")).unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let sessions = Arc::clone(&sessions);
            let old = old.clone();
            handles.push(tokio::spawn(async move { sessions.renew(&old, None).await }));
        }

        let mut renewed = Vec::new();
        for handle in handles {
            match handle.await.unwrap() {
                Ok(token) => renewed.push(token),
                Err(ServerError::Unauthenticated) => {}
                Err(e) => panic!("unexpected error: {}", e),
            }
        }

        assert_eq!(renewed.len(), 1);
        assert!(sessions.check_token(&renewed[0]).await.is_some());
        assert!(sessions.check_token(&old).await.is_none());
    }

    #[tokio::test]
    async fn test_renew_requires_active_token() {
        let (sessions, clock, _) = manager();
        let token = sessions.generate_token(&TokenPayload::for_user("alice"), 5).unwrap();
        clock.advance(10);

        let err = sessions.renew(&token, None).await.unwrap_err();
        assert!(matches!(err, ServerError::Unauthenticated));
    }

    #[tokio::test]
    async fn test_fail_closed_when_store_down() {
        let clock = Arc::new(ManualClock::new(1_700_000_000));
        let codec = Arc::new(JwtService::with_clock(SECRET, clock));
        let sessions = SessionManager::new(codec, Arc::new(DownStore), 3600);

        let token = sessions.generate_default_token(&TokenPayload::for_user("alice")).unwrap();
        assert!(sessions.check_token(&token).await.is_none());

        let err = sessions.blacklist_token(&token).await.unwrap_err();
        assert!(err.is_store_failure());
    }

    #[tokio::test]
    async fn test_remove_expired_tokens() {
        let (sessions, clock, store) = manager();
        let short = sessions.generate_token(&TokenPayload::for_user("a"), 30).unwrap();
        let long = sessions.generate_token(&TokenPayload::for_user("b"), 7200).unwrap();
        sessions.blacklist_token(&short).await.unwrap();
        sessions.blacklist_token(&long).await.unwrap();

        clock.advance(60);
        assert_eq!(sessions.remove_expired_tokens().await.unwrap(), 1);
        assert_eq!(store.len(), 1);
        assert!(sessions.check_token(&long).await.is_none());
    }
}
