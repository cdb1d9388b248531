use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::auth::models::TokenPayload;
use crate::auth::{hash_password_with_cost, verify_password, SessionManager, PASSWORD_COST};
use crate::error::{Result, ServerError};
use crate::model::profile::SocialProfile;
use crate::model::user::{AuthenticatedUser, NewUser, UserId};
use crate::repository::{IdentityDirectory, ProfileStore};
use crate::service::resolve_user_id;

/// 注册请求
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub email: String,
}

/// 用户名规范化，注册与登录共用
fn normalize_username(raw: &str) -> &str {
    raw.trim()
}

impl RegisterRequest {
    fn validated(self) -> Result<Self> {
        let username = normalize_username(&self.username).to_string();
        let email = self.email.trim().to_string();
        if username.is_empty() || email.is_empty() || self.password.is_empty() {
            return Err(ServerError::Validation(
                "Username, password and email are required".to_string(),
            ));
        }
        if !email.contains('@') {
            return Err(ServerError::Validation("Invalid email".to_string()));
        }
        Ok(Self {
            username,
            email,
            password: self.password,
        })
    }
}

/// 登录结果
#[derive(Debug, Clone, Serialize)]
pub struct LoginOutcome {
    pub token: String,
    /// 请求携带的 token 仍有效且属于同一用户，直接返回原 token
    pub already_logged_in: bool,
}

/// 账号服务：注册、登录、登出、续期、请求认证
pub struct AuthService {
    sessions: Arc<SessionManager>,
    directory: Arc<dyn IdentityDirectory>,
    profiles: Arc<dyn ProfileStore>,
    token_ttl: i64,
    password_cost: u32,
}

impl AuthService {
    pub fn new(
        sessions: Arc<SessionManager>,
        directory: Arc<dyn IdentityDirectory>,
        profiles: Arc<dyn ProfileStore>,
        token_ttl: i64,
    ) -> Self {
        Self {
            sessions,
            directory,
            profiles,
            token_ttl,
            password_cost: PASSWORD_COST,
        }
    }

    /// 调整 bcrypt 成本（测试中用最低成本）
    pub fn with_password_cost(mut self, cost: u32) -> Self {
        self.password_cost = cost;
        self
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// 注册
    ///
    /// 用户名或邮箱已存在时返回 `Conflict`，不做任何写入。
    /// 身份记录写入后再创建空档案文档。
    pub async fn register(&self, request: RegisterRequest, client_ip: Option<&str>) -> Result<UserId> {
        let request = request.validated()?;

        if self
            .directory
            .find_user_id_by_username_or_email(&request.username, &request.email)
            .await?
            .is_some()
        {
            info!(
                "注册被拒绝，用户已存在: username={}, ip={}",
                request.username,
                client_ip.unwrap_or("-")
            );
            return Err(ServerError::Conflict("User already exists".to_string()));
        }

        let password = request.password;
        let cost = self.password_cost;
        let password_hash = tokio::task::spawn_blocking(move || hash_password_with_cost(&password, cost))
            .await
            .map_err(|e| ServerError::Internal(format!("密码加密任务失败: {}", e)))??;

        let user_id = self
            .directory
            .insert_user(NewUser {
                username: request.username.clone(),
                email: request.email,
                password_hash,
            })
            .await?;

        self.profiles
            .create_profile(SocialProfile::registered(
                user_id,
                request.username.clone(),
                Utc::now(),
                client_ip.map(str::to_string),
            ))
            .await?;

        info!(
            "✅ 用户注册成功: username={}, user_id={}, ip={}",
            request.username,
            user_id,
            client_ip.unwrap_or("-")
        );
        Ok(user_id)
    }

    /// 登录
    ///
    /// 携带的 token 对同一用户仍有效时视为已登录；属于其他用户时拒绝。
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        presented_token: Option<&str>,
        client_ip: Option<&str>,
    ) -> Result<LoginOutcome> {
        let ip = client_ip.unwrap_or("-");
        let username = normalize_username(username);

        if let Some(token) = presented_token {
            if let Some(claims) = self.sessions.check_token(token).await {
                if claims.username == username {
                    info!("用户已登录: username={}, ip={}", username, ip);
                    return Ok(LoginOutcome {
                        token: token.to_string(),
                        already_logged_in: true,
                    });
                }
                warn!(
                    "⚠️ 登录请求携带了其他用户的有效 token: username={}, ip={}",
                    username, ip
                );
                return Err(ServerError::Unauthenticated);
            }
        }

        let record = self
            .directory
            .find_credentials(username)
            .await?
            .ok_or_else(|| ServerError::NotFound("User not found".to_string()))?;

        let password = password.to_string();
        let hash = record.password_hash.clone();
        let matched = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
            .await
            .map_err(|e| ServerError::Internal(format!("密码校验任务失败: {}", e)))?;
        if !matched {
            warn!("⚠️ 密码错误: username={}, ip={}", username, ip);
            return Err(ServerError::Validation("Invalid password".to_string()));
        }

        let token = self
            .sessions
            .generate_token(&TokenPayload::for_user(&record.username), self.token_ttl)?;
        info!("✅ 登录成功: username={}, ip={}", username, ip);

        Ok(LoginOutcome {
            token,
            already_logged_in: false,
        })
    }

    /// 登出：撤销当前 token
    ///
    /// 撤销集合不可用时返回 `StoreUnavailable`，登出视为未完成。
    pub async fn logout(&self, token: &str, client_ip: Option<&str>) -> Result<()> {
        let claims = self
            .sessions
            .check_token(token)
            .await
            .ok_or(ServerError::Unauthenticated)?;

        self.sessions.blacklist_token(token).await?;
        info!(
            "👋 用户登出: username={}, ip={}",
            claims.username,
            client_ip.unwrap_or("-")
        );
        Ok(())
    }

    /// 续期：签发新 token 并撤销旧 token
    pub async fn renew_token(&self, token: &str) -> Result<String> {
        self.sessions.renew(token, Some(self.token_ttl)).await
    }

    /// 校验 token 并解析数字用户 ID
    pub async fn authenticate(&self, token: &str) -> Result<AuthenticatedUser> {
        let claims = self
            .sessions
            .check_token(token)
            .await
            .ok_or(ServerError::Unauthenticated)?;

        let user_id = resolve_user_id(self.directory.as_ref(), &claims.username).await?;
        Ok(AuthenticatedUser {
            user_id,
            username: claims.username,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::clock::ManualClock;
    use crate::auth::token_revocation::MemoryRevocationStore;
    use crate::auth::JwtService;
    use crate::repository::{MemoryIdentityDirectory, MemoryProfileStore};

    struct Fixture {
        service: AuthService,
        clock: Arc<ManualClock>,
        profiles: Arc<MemoryProfileStore>,
        directory: Arc<MemoryIdentityDirectory>,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::starting_now());
        let codec = Arc::new(JwtService::with_clock("auth-service-secret-0123456789", clock.clone()));
        let sessions = Arc::new(SessionManager::new(
            codec,
            Arc::new(MemoryRevocationStore::new()),
            3600,
        ));
        let directory = Arc::new(MemoryIdentityDirectory::new());
        let profiles = Arc::new(MemoryProfileStore::new());
        let service = AuthService::new(sessions, directory.clone(), profiles.clone(), 3600)
            .with_password_cost(4);
        Fixture {
            service,
            clock,
            profiles,
            directory,
        }
    }

    fn register_request(username: &str) -> RegisterRequest {
        RegisterRequest {
            username: username.to_string(),
            password: "secret123".to_string(),
            email: format!("{}@example.com", username),
        }
    }

    #[tokio::test]
    async fn test_register_creates_identity_and_profile() {
        let f = fixture();
        let id = f
            .service
            .register(register_request("alice"), Some("10.0.0.1"))
            .await
            .unwrap();

        let profile = f.profiles.get_profile(id).await.unwrap().unwrap();
        assert_eq!(profile.username, "alice");
        assert_eq!(profile.registration_ip.as_deref(), Some("10.0.0.1"));
        assert!(profile.likes.is_empty());
    }

    #[tokio::test]
    async fn test_register_duplicate_conflicts_without_write() {
        let f = fixture();
        f.service.register(register_request("alice"), None).await.unwrap();

        let err = f
            .service
            .register(register_request("alice"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::Conflict(ref m) if m == "User already exists"));
        assert_eq!(f.directory.len(), 1);
    }

    #[tokio::test]
    async fn test_register_requires_fields() {
        let f = fixture();
        let mut req = register_request("alice");
        req.password.clear();
        assert!(matches!(
            f.service.register(req, None).await.unwrap_err(),
            ServerError::Validation(_)
        ));
    }

    #[tokio::test]
    async fn test_login_outcomes() {
        let f = fixture();
        f.service.register(register_request("alice"), None).await.unwrap();

        assert!(matches!(
            f.service.login("bob", "secret123", None, None).await.unwrap_err(),
            ServerError::NotFound(_)
        ));
        assert!(matches!(
            f.service.login("alice", "wrong", None, None).await.unwrap_err(),
            ServerError::Validation(_)
        ));

        let outcome = f.service.login("alice", "secret123", None, None).await.unwrap();
        assert!(!outcome.already_logged_in);

        let again = f
            .service
            .login("alice", "secret123", Some(&outcome.token), None)
            .await
            .unwrap();
        assert!(again.already_logged_in);
        assert_eq!(again.token, outcome.token);
    }

    #[tokio::test]
    async fn test_login_accepts_same_input_as_register() {
        let f = fixture();
        f.service.register(register_request(" alice "), None).await.unwrap();

        let outcome = f.service.login(" alice ", "secret123", None, None).await.unwrap();
        let again = f
            .service
            .login("alice", "secret123", Some(&outcome.token), None)
            .await
            .unwrap();
        assert!(again.already_logged_in);
        assert_eq!(f.service.authenticate(&outcome.token).await.unwrap().username, "alice");
    }

    #[tokio::test]
    async fn test_login_with_foreign_token_rejected() {
        let f = fixture();
        f.service.register(register_request("alice"), None).await.unwrap();
        f.service.register(register_request("bob"), None).await.unwrap();
        let bob = f.service.login("bob", "secret123", None, None).await.unwrap();

        let err = f
            .service
            .login("alice", "secret123", Some(&bob.token), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::Unauthenticated));
    }

    #[tokio::test]
    async fn test_logout_then_authenticate_fails() {
        let f = fixture();
        f.service.register(register_request("alice"), None).await.unwrap();
        let token = f.service.login("alice", "secret123", None, None).await.unwrap().token;

        let user = f.service.authenticate(&token).await.unwrap();
        assert_eq!(user.username, "alice");

        f.service.logout(&token, None).await.unwrap();
        assert!(matches!(
            f.service.authenticate(&token).await.unwrap_err(),
            ServerError::Unauthenticated
        ));
        assert!(matches!(
            f.service.logout(&token, None).await.unwrap_err(),
            ServerError::Unauthenticated
        ));
    }

    #[tokio::test]
    async fn test_authenticate_expired_token() {
        let f = fixture();
        f.service.register(register_request("alice"), None).await.unwrap();
        let token = f.service.login("alice", "secret123", None, None).await.unwrap().token;

        f.clock.advance(3601);
        assert!(matches!(
            f.service.authenticate(&token).await.unwrap_err(),
            ServerError::Unauthenticated
        ));
    }

    #[tokio::test]
    async fn test_valid_token_for_unknown_user_is_not_found() {
        let f = fixture();
        let token = f
            .service
            .sessions()
            .generate_token(&TokenPayload::for_user("ghost"), 60)
            .unwrap();
        assert!(matches!(
            f.service.authenticate(&token).await.unwrap_err(),
            ServerError::NotFound(_)
        ));
    }
}
