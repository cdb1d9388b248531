//! 身份目录 - 用户名 / 邮箱到数字用户 ID 的权威映射

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use sqlx::PgPool;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{Result, ServerError};
use crate::infra::with_store_timeout;
use crate::model::user::{IdentityRecord, NewUser, UserId};

/// 身份目录接口
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    /// 按用户名查找数字 ID
    async fn find_user_id(&self, username: &str) -> Result<Option<UserId>>;

    /// 用户名或邮箱任一已被占用即返回对应 ID（注册前的唯一性检查）
    async fn find_user_id_by_username_or_email(
        &self,
        username: &str,
        email: &str,
    ) -> Result<Option<UserId>>;

    /// 登录校验用：完整身份记录（含密码哈希）
    async fn find_credentials(&self, username: &str) -> Result<Option<IdentityRecord>>;

    /// 插入用户，用户名或邮箱冲突时返回 `Conflict`
    async fn insert_user(&self, user: NewUser) -> Result<UserId>;
}

/// PostgreSQL 身份目录
#[derive(Clone)]
pub struct PgIdentityDirectory {
    pool: PgPool,
    timeout: Duration,
}

impl PgIdentityDirectory {
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }
}

#[async_trait]
impl IdentityDirectory for PgIdentityDirectory {
    async fn find_user_id(&self, username: &str) -> Result<Option<UserId>> {
        with_store_timeout(self.timeout, "find_user_id", async {
            let id = sqlx::query_scalar::<_, i64>("SELECT user_id FROM users WHERE username = $1")
                .bind(username)
                .fetch_optional(&self.pool)
                .await?;
            Ok(id)
        })
        .await
    }

    async fn find_user_id_by_username_or_email(
        &self,
        username: &str,
        email: &str,
    ) -> Result<Option<UserId>> {
        with_store_timeout(self.timeout, "find_user_id_by_username_or_email", async {
            let id = sqlx::query_scalar::<_, i64>(
                "SELECT user_id FROM users WHERE username = $1 OR email = $2 LIMIT 1",
            )
            .bind(username)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
            Ok(id)
        })
        .await
    }

    async fn find_credentials(&self, username: &str) -> Result<Option<IdentityRecord>> {
        with_store_timeout(self.timeout, "find_credentials", async {
            let record = sqlx::query_as::<_, IdentityRecord>(
                r#"
                SELECT user_id, username, email, password_hash, created_at
                FROM users
                WHERE username = $1
                "#,
            )
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
            Ok(record)
        })
        .await
    }

    async fn insert_user(&self, user: NewUser) -> Result<UserId> {
        with_store_timeout(self.timeout, "insert_user", async {
            let result = sqlx::query_scalar::<_, i64>(
                r#"
                INSERT INTO users (username, email, password_hash)
                VALUES ($1, $2, $3)
                RETURNING user_id
                "#,
            )
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.password_hash)
            .fetch_one(&self.pool)
            .await;

            match result {
                Ok(id) => Ok(id),
                // 唯一性检查之后仍可能被并发注册抢先
                Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                    Err(ServerError::Conflict("User already exists".to_string()))
                }
                Err(e) => Err(e.into()),
            }
        })
        .await
    }
}

/// 内存身份目录（开发模式与测试），保持与数据库相同的唯一性约束
pub struct MemoryIdentityDirectory {
    by_username: DashMap<String, IdentityRecord>,
    emails: DashMap<String, UserId>,
    next_id: AtomicI64,
    /// 插入时串行化两个索引的唯一性检查
    insert_lock: Mutex<()>,
}

impl Default for MemoryIdentityDirectory {
    fn default() -> Self {
        Self {
            by_username: DashMap::new(),
            emails: DashMap::new(),
            next_id: AtomicI64::new(1),
            insert_lock: Mutex::new(()),
        }
    }
}

impl MemoryIdentityDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.by_username.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_username.is_empty()
    }
}

#[async_trait]
impl IdentityDirectory for MemoryIdentityDirectory {
    async fn find_user_id(&self, username: &str) -> Result<Option<UserId>> {
        Ok(self.by_username.get(username).map(|r| r.user_id))
    }

    async fn find_user_id_by_username_or_email(
        &self,
        username: &str,
        email: &str,
    ) -> Result<Option<UserId>> {
        if let Some(id) = self.find_user_id(username).await? {
            return Ok(Some(id));
        }
        Ok(self.emails.get(email).map(|id| *id))
    }

    async fn find_credentials(&self, username: &str) -> Result<Option<IdentityRecord>> {
        Ok(self.by_username.get(username).map(|r| r.clone()))
    }

    async fn insert_user(&self, user: NewUser) -> Result<UserId> {
        let _guard = self
            .insert_lock
            .lock()
            .map_err(|_| ServerError::Internal("identity directory lock poisoned".to_string()))?;

        if self.by_username.contains_key(&user.username) || self.emails.contains_key(&user.email) {
            return Err(ServerError::Conflict("User already exists".to_string()));
        }

        let user_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.emails.insert(user.email.clone(), user_id);
        self.by_username.insert(
            user.username.clone(),
            IdentityRecord {
                user_id,
                username: user.username,
                email: user.email,
                password_hash: user.password_hash,
                created_at: Utc::now(),
            },
        );
        Ok(user_id)
    }
}
