//! token 生命周期：签发、校验、过期、撤销、续期与清理

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use blog_server::auth::{
    JwtService, ManualClock, MemoryRevocationStore, RevocationStore, SessionManager, TokenPayload, TokenVerdict,
};
use blog_server::error::{Result, ServerError};

const SECRET: &str = "integration-secret-with-enough-entropy";

fn session_manager(clock: Arc<ManualClock>) -> (SessionManager, Arc<MemoryRevocationStore>) {
    let store = Arc::new(MemoryRevocationStore::new());
    let codec = Arc::new(JwtService::with_clock(SECRET, clock));
    (SessionManager::new(codec, store.clone(), 3600), store)
}

#[tokio::test]
async fn issue_then_verify_returns_claims() {
    let clock = Arc::new(ManualClock::starting_now());
    let (sessions, _) = session_manager(clock);

    let payload = TokenPayload::for_user("alice").with_claim("role", serde_json::json!("writer"));
    let token = sessions.generate_token(&payload, 3600).unwrap();

    let claims = sessions.check_token(&token).await.unwrap();
    assert_eq!(claims.username, "alice");
    assert_eq!(claims.payload(), payload);
}

#[tokio::test]
async fn token_expires_exactly_at_ttl() {
    let clock = Arc::new(ManualClock::new(1_700_000_000));
    let (sessions, _) = session_manager(clock.clone());
    let token = sessions.generate_token(&TokenPayload::for_user("alice"), 1).unwrap();

    assert!(sessions.check_token(&token).await.is_some());
    clock.advance(1);
    assert!(sessions.check_token(&token).await.is_none());
    assert!(matches!(sessions.codec().inspect(&token), TokenVerdict::Expired(_)));
}

#[tokio::test]
async fn non_positive_ttl_is_immediately_expired() {
    let clock = Arc::new(ManualClock::starting_now());
    let (sessions, _) = session_manager(clock);

    for ttl in [0, -10] {
        let token = sessions.generate_token(&TokenPayload::for_user("alice"), ttl).unwrap();
        assert!(sessions.check_token(&token).await.is_none());
    }
}

#[tokio::test]
async fn tampered_or_foreign_tokens_are_rejected() {
    let clock = Arc::new(ManualClock::starting_now());
    let (sessions, _) = session_manager(clock.clone());
    let token = sessions.generate_token(&TokenPayload::for_user("alice"), 3600).unwrap();

    // alice 的签名配上 mallory 的载荷
    let mallory = sessions.generate_token(&TokenPayload::for_user("mallory"), 3600).unwrap();
    let parts: Vec<&str> = token.split('.').collect();
    let forged_payload = mallory.split('.').nth(1).unwrap();
    let tampered = format!("{}.{}.{}", parts[0], forged_payload, parts[2]);
    assert!(sessions.check_token(&tampered).await.is_none());

    let other = JwtService::with_clock("a-completely-different-secret", clock);
    let foreign = other.issue(&TokenPayload::for_user("alice"), 3600).unwrap();
    assert!(sessions.check_token(&foreign).await.is_none());
    assert!(sessions.check_token("not.a.jwt").await.is_none());
}

#[tokio::test]
async fn tokens_are_unique_per_issuance() {
    let clock = Arc::new(ManualClock::starting_now());
    let (sessions, _) = session_manager(clock);
    let payload = TokenPayload::for_user("alice");

    let a = sessions.generate_token(&payload, 3600).unwrap();
    let b = sessions.generate_token(&payload, 3600).unwrap();
    assert_ne!(a, b);

    sessions.blacklist_token(&a).await.unwrap();
    assert!(sessions.check_token(&a).await.is_none());
    assert!(sessions.check_token(&b).await.is_some());
}

#[tokio::test]
async fn revoke_is_idempotent() {
    let clock = Arc::new(ManualClock::starting_now());
    let (sessions, store) = session_manager(clock);
    let token = sessions.generate_default_token(&TokenPayload::for_user("alice")).unwrap();

    sessions.blacklist_token(&token).await.unwrap();
    sessions.blacklist_token(&token).await.unwrap();
    assert_eq!(store.len(), 1);
    assert!(sessions.check_token(&token).await.is_none());
}

#[tokio::test]
async fn renew_revokes_old_and_keeps_claims() {
    let clock = Arc::new(ManualClock::starting_now());
    let (sessions, _) = session_manager(clock.clone());
    let old = sessions.generate_token(&TokenPayload::for_user("alice"), 60).unwrap();

    clock.advance(30);
    let new = sessions.renew(&old, Some(3600)).await.unwrap();

    assert!(sessions.check_token(&old).await.is_none());
    let claims = sessions.check_token(&new).await.unwrap();
    assert_eq!(claims.username, "alice");

    clock.advance(60);
    assert!(sessions.check_token(&new).await.is_some());
    assert!(matches!(
        sessions.renew(&old, None).await.unwrap_err(),
        ServerError::Unauthenticated
    ));
}

#[tokio::test]
async fn sweep_removes_only_expired_entries() {
    let clock = Arc::new(ManualClock::starting_now());
    let (sessions, store) = session_manager(clock.clone());

    let short = sessions.generate_token(&TokenPayload::for_user("a"), 10).unwrap();
    let long = sessions.generate_token(&TokenPayload::for_user("b"), 1000).unwrap();
    sessions.blacklist_token(&short).await.unwrap();
    sessions.blacklist_token(&long).await.unwrap();

    assert_eq!(sessions.remove_expired_tokens().await.unwrap(), 0);
    clock.advance(11);
    assert_eq!(sessions.remove_expired_tokens().await.unwrap(), 1);

    assert_eq!(store.len(), 1);
    assert!(store.contains(&long).await.unwrap());
    assert!(sessions.check_token(&long).await.is_none());
}

/// 写入失败、读取正常的撤销集合
struct WriteFailingStore {
    inner: MemoryRevocationStore,
    fail_writes: AtomicBool,
}

#[async_trait]
impl RevocationStore for WriteFailingStore {
    async fn add(&self, token: &str) -> Result<bool> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(ServerError::StoreUnavailable("write refused".into()));
        }
        self.inner.add(token).await
    }

    async fn contains(&self, token: &str) -> Result<bool> {
        self.inner.contains(token).await
    }

    async fn remove(&self, token: &str) -> Result<bool> {
        self.inner.remove(token).await
    }

    async fn members(&self) -> Result<Vec<String>> {
        self.inner.members().await
    }

    fn backend(&self) -> &'static str {
        "write-failing"
    }
}

#[tokio::test]
async fn renew_returns_new_token_even_if_old_revocation_fails() {
    let clock = Arc::new(ManualClock::starting_now());
    let store = Arc::new(WriteFailingStore {
        inner: MemoryRevocationStore::new(),
        fail_writes: AtomicBool::new(true),
    });
    let sessions = SessionManager::new(Arc::new(JwtService::with_clock(SECRET, clock)), store.clone(), 3600);

    let old = sessions.generate_default_token(&TokenPayload::for_user("alice")).unwrap();
    let new = sessions.renew(&old, None).await.unwrap();

    // 补偿失败：两个 token 都仍然有效
    assert!(sessions.check_token(&old).await.is_some());
    assert!(sessions.check_token(&new).await.is_some());

    // 登出在撤销集合不可写时必须报错
    assert!(sessions.blacklist_token(&new).await.unwrap_err().is_store_failure());

    store.fail_writes.store(false, Ordering::SeqCst);
    sessions.blacklist_token(&new).await.unwrap();
    assert!(sessions.check_token(&new).await.is_none());
}

#[tokio::test]
async fn concurrent_checks_see_revocation() {
    let clock = Arc::new(ManualClock::starting_now());
    let (sessions, _) = session_manager(clock);
    let sessions = Arc::new(sessions);
    let token = sessions.generate_default_token(&TokenPayload::for_user("alice")).unwrap();
    sessions.blacklist_token(&token).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..16 {
        let sessions = Arc::clone(&sessions);
        let token = token.clone();
        handles.push(tokio::spawn(async move { sessions.check_token(&token).await }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().is_none());
    }
}
