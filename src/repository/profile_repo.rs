//! 社交档案文档存储：阅读记录、点赞、订阅关系
//!
//! 所有写入以数字用户 ID 为键；档案不存在时按需创建（upsert）。
//! 点赞 / 订阅是条件写入：判断与修改在同一条语句（或同一把锁）内完成，
//! 并发的重复请求只有一个生效。

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use dashmap::DashMap;
use serde_json::{json, Value};
use sqlx::{PgPool, Postgres, Transaction};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::{Result, ServerError};
use crate::infra::with_store_timeout;
use crate::model::profile::{ActivityEntry, HistoryUpdate, SocialProfile};
use crate::model::user::UserId;

/// 档案存储接口
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// 创建档案；已存在时只合并注册信息，不清空已有数组
    async fn create_profile(&self, profile: SocialProfile) -> Result<()>;

    async fn get_profile(&self, user_id: UserId) -> Result<Option<SocialProfile>>;

    /// 加入阅读记录；已读过的帖子只刷新时间戳
    async fn push_history(&self, user_id: UserId, post_id: &str, at: DateTime<Utc>) -> Result<HistoryUpdate>;

    /// 条件点赞，返回是否新增
    async fn push_like(&self, user_id: UserId, post_id: &str, at: DateTime<Utc>) -> Result<bool>;

    /// 取消点赞，返回是否确实删除
    async fn pull_like(&self, user_id: UserId, post_id: &str) -> Result<bool>;

    /// 订阅：同时写入订阅者的 subscribed_to 与目标的 subscribers，返回是否新增
    async fn push_subscription(&self, subscriber: UserId, target: UserId) -> Result<bool>;

    /// 取消订阅，返回是否确实删除
    async fn pull_subscription(&self, subscriber: UserId, target: UserId) -> Result<bool>;
}

/// PostgreSQL JSONB 档案存储
#[derive(Clone)]
pub struct PgProfileStore {
    pool: PgPool,
    timeout: Duration,
}

impl PgProfileStore {
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    /// 档案不存在时插入空文档
    async fn ensure_profile<'e, E>(executor: E, user_id: UserId) -> Result<()>
    where
        E: sqlx::Executor<'e, Database = Postgres>,
    {
        let empty = serde_json::to_value(SocialProfile::empty(user_id, ""))?;
        sqlx::query(
            "INSERT INTO social_profiles (user_id, doc) VALUES ($1, $2) ON CONFLICT (user_id) DO NOTHING",
        )
        .bind(user_id)
        .bind(empty)
        .execute(executor)
        .await?;
        Ok(())
    }

    fn post_needle(post_id: &str) -> Value {
        json!([{ "post_id": post_id }])
    }

    fn entry_array(post_id: &str, at: DateTime<Utc>) -> Result<Value> {
        Ok(Value::Array(vec![serde_json::to_value(ActivityEntry::new(post_id, at))?]))
    }

    /// 已读过：只刷新时间戳
    async fn refresh_history(&self, user_id: UserId, post_id: &str, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE social_profiles
            SET doc = jsonb_set(doc, '{history}', (
                SELECT jsonb_agg(
                    CASE WHEN e->>'post_id' = $2
                         THEN jsonb_set(e, '{timestamp}', to_jsonb($3::text))
                         ELSE e END)
                FROM jsonb_array_elements(doc->'history') AS e
            ))
            WHERE user_id = $1 AND COALESCE(doc->'history', '[]'::jsonb) @> $4
            "#,
        )
        .bind(user_id)
        .bind(post_id)
        .bind(at.to_rfc3339_opts(SecondsFormat::AutoSi, true))
        .bind(Self::post_needle(post_id))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_subscription(
        tx: &mut Transaction<'_, Postgres>,
        owner: UserId,
        field: &'static str,
        other: UserId,
        add: bool,
    ) -> std::result::Result<bool, sqlx::Error> {
        let needle = json!([other]);
        let sql = if add {
            format!(
                r#"
                UPDATE social_profiles
                SET doc = jsonb_set(doc, '{{{field}}}', COALESCE(doc->'{field}', '[]'::jsonb) || $2)
                WHERE user_id = $1 AND NOT COALESCE(doc->'{field}', '[]'::jsonb) @> $2
                "#
            )
        } else {
            format!(
                r#"
                UPDATE social_profiles
                SET doc = jsonb_set(doc, '{{{field}}}', COALESCE((
                    SELECT jsonb_agg(e) FROM jsonb_array_elements(doc->'{field}') AS e
                    WHERE NOT jsonb_build_array(e) @> $2
                ), '[]'::jsonb))
                WHERE user_id = $1 AND COALESCE(doc->'{field}', '[]'::jsonb) @> $2
                "#
            )
        };

        let result = sqlx::query(&sql)
            .bind(owner)
            .bind(needle)
            .execute(&mut **tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// 一次事务内修改双方档案
    ///
    /// 两行先按 user_id 升序创建并加行锁，再做条件更新；
    /// A→B 与 B→A 并发时加锁顺序一致，不会互相等待成环。
    async fn try_change_subscription(
        &self,
        subscriber: UserId,
        target: UserId,
        add: bool,
        seeds: &[(UserId, Value)],
    ) -> std::result::Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        for (user_id, empty) in seeds {
            sqlx::query(
                "INSERT INTO social_profiles (user_id, doc) VALUES ($1, $2) ON CONFLICT (user_id) DO NOTHING",
            )
            .bind(user_id)
            .bind(empty)
            .execute(&mut *tx)
            .await?;
        }

        let ids: Vec<UserId> = seeds.iter().map(|(id, _)| *id).collect();
        sqlx::query("SELECT user_id FROM social_profiles WHERE user_id = ANY($1) ORDER BY user_id FOR UPDATE")
            .bind(&ids)
            .fetch_all(&mut *tx)
            .await?;

        let changed = Self::update_subscription(&mut tx, subscriber, "subscribed_to", target, add).await?;
        if changed {
            Self::update_subscription(&mut tx, target, "subscribers", subscriber, add).await?;
        }

        tx.commit().await?;
        Ok(changed)
    }

    async fn change_subscription(&self, subscriber: UserId, target: UserId, add: bool) -> Result<bool> {
        let mut seeds = Vec::with_capacity(2);
        for user_id in lock_order(subscriber, target) {
            seeds.push((user_id, serde_json::to_value(SocialProfile::empty(user_id, ""))?));
        }

        let mut attempt = 1;
        loop {
            match self.try_change_subscription(subscriber, target, add, &seeds).await {
                Ok(changed) => return Ok(changed),
                Err(e) if is_lock_conflict(&e) && attempt < SUBSCRIPTION_ATTEMPTS => {
                    warn!(
                        "⚠️ 订阅事务锁冲突，重试 ({}/{}): {} -> {}",
                        attempt, SUBSCRIPTION_ATTEMPTS, subscriber, target
                    );
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// 订阅事务遇到死锁 / 序列化失败时的最大尝试次数
const SUBSCRIPTION_ATTEMPTS: usize = 3;

/// 两个档案的加锁顺序：升序、去重
fn lock_order(a: UserId, b: UserId) -> Vec<UserId> {
    let mut ids = vec![a, b];
    ids.sort_unstable();
    ids.dedup();
    ids
}

/// 40P01 deadlock_detected / 40001 serialization_failure
fn is_lock_conflict(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == "40P01" || code == "40001")
}

#[async_trait]
impl ProfileStore for PgProfileStore {
    async fn create_profile(&self, profile: SocialProfile) -> Result<()> {
        with_store_timeout(self.timeout, "create_profile", async {
            let user_id = profile.user_id;
            let doc = serde_json::to_value(&profile)?;
            sqlx::query(
                r#"
                INSERT INTO social_profiles (user_id, doc) VALUES ($1, $2)
                ON CONFLICT (user_id) DO UPDATE
                SET doc = social_profiles.doc || jsonb_build_object(
                    'username', EXCLUDED.doc->'username',
                    'account_created', EXCLUDED.doc->'account_created',
                    'registration_ip', EXCLUDED.doc->'registration_ip'
                )
                "#,
            )
            .bind(user_id)
            .bind(doc)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn get_profile(&self, user_id: UserId) -> Result<Option<SocialProfile>> {
        with_store_timeout(self.timeout, "get_profile", async {
            let doc = sqlx::query_scalar::<_, Value>("SELECT doc FROM social_profiles WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
            doc.map(serde_json::from_value::<SocialProfile>)
                .transpose()
                .map_err(ServerError::from)
        })
        .await
    }

    async fn push_history(&self, user_id: UserId, post_id: &str, at: DateTime<Utc>) -> Result<HistoryUpdate> {
        with_store_timeout(self.timeout, "push_history", async {
            Self::ensure_profile(&self.pool, user_id).await?;

            if self.refresh_history(user_id, post_id, at).await? {
                return Ok(HistoryUpdate::TimestampUpdated);
            }

            let appended = sqlx::query(
                r#"
                UPDATE social_profiles
                SET doc = jsonb_set(doc, '{history}', COALESCE(doc->'history', '[]'::jsonb) || $2)
                WHERE user_id = $1 AND NOT COALESCE(doc->'history', '[]'::jsonb) @> $3
                "#,
            )
            .bind(user_id)
            .bind(Self::entry_array(post_id, at)?)
            .bind(Self::post_needle(post_id))
            .execute(&self.pool)
            .await?;

            if appended.rows_affected() > 0 {
                Ok(HistoryUpdate::Added)
            } else {
                // 并发请求抢先写入了同一帖子
                self.refresh_history(user_id, post_id, at).await?;
                Ok(HistoryUpdate::TimestampUpdated)
            }
        })
        .await
    }

    async fn push_like(&self, user_id: UserId, post_id: &str, at: DateTime<Utc>) -> Result<bool> {
        with_store_timeout(self.timeout, "push_like", async {
            Self::ensure_profile(&self.pool, user_id).await?;
            let result = sqlx::query(
                r#"
                UPDATE social_profiles
                SET doc = jsonb_set(doc, '{likes}', COALESCE(doc->'likes', '[]'::jsonb) || $2)
                WHERE user_id = $1 AND NOT COALESCE(doc->'likes', '[]'::jsonb) @> $3
                "#,
            )
            .bind(user_id)
            .bind(Self::entry_array(post_id, at)?)
            .bind(Self::post_needle(post_id))
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() > 0)
        })
        .await
    }

    async fn pull_like(&self, user_id: UserId, post_id: &str) -> Result<bool> {
        with_store_timeout(self.timeout, "pull_like", async {
            let result = sqlx::query(
                r#"
                UPDATE social_profiles
                SET doc = jsonb_set(doc, '{likes}', COALESCE((
                    SELECT jsonb_agg(e) FROM jsonb_array_elements(doc->'likes') AS e
                    WHERE e->>'post_id' <> $2
                ), '[]'::jsonb))
                WHERE user_id = $1 AND COALESCE(doc->'likes', '[]'::jsonb) @> $3
                "#,
            )
            .bind(user_id)
            .bind(post_id)
            .bind(Self::post_needle(post_id))
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() > 0)
        })
        .await
    }

    async fn push_subscription(&self, subscriber: UserId, target: UserId) -> Result<bool> {
        with_store_timeout(
            self.timeout,
            "push_subscription",
            self.change_subscription(subscriber, target, true),
        )
        .await
    }

    async fn pull_subscription(&self, subscriber: UserId, target: UserId) -> Result<bool> {
        with_store_timeout(
            self.timeout,
            "pull_subscription",
            self.change_subscription(subscriber, target, false),
        )
        .await
    }
}

/// 内存档案存储（开发模式与测试）
///
/// 每个档案的读改写都在 DashMap 的 entry 锁内完成。
/// 订阅要同时改两个档案，另用一把互斥锁串行化，保证双方数组一致。
#[derive(Default)]
pub struct MemoryProfileStore {
    profiles: DashMap<UserId, SocialProfile>,
    subscriptions: Mutex<()>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 在档案的 entry 锁内执行修改，档案不存在时先创建
    fn modify<T>(&self, user_id: UserId, f: impl FnOnce(&mut SocialProfile) -> T) -> T {
        let mut entry = self
            .profiles
            .entry(user_id)
            .or_insert_with(|| SocialProfile::empty(user_id, ""));
        f(entry.value_mut())
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn create_profile(&self, profile: SocialProfile) -> Result<()> {
        self.modify(profile.user_id, |existing| {
            existing.username = profile.username;
            existing.account_created = profile.account_created;
            existing.registration_ip = profile.registration_ip;
        });
        Ok(())
    }

    async fn get_profile(&self, user_id: UserId) -> Result<Option<SocialProfile>> {
        Ok(self.profiles.get(&user_id).map(|p| p.clone()))
    }

    async fn push_history(&self, user_id: UserId, post_id: &str, at: DateTime<Utc>) -> Result<HistoryUpdate> {
        let added = self.modify(user_id, |p| p.touch_history(post_id, at));
        Ok(if added {
            HistoryUpdate::Added
        } else {
            HistoryUpdate::TimestampUpdated
        })
    }

    async fn push_like(&self, user_id: UserId, post_id: &str, at: DateTime<Utc>) -> Result<bool> {
        Ok(self.modify(user_id, |p| p.add_like(post_id, at)))
    }

    async fn pull_like(&self, user_id: UserId, post_id: &str) -> Result<bool> {
        Ok(self
            .profiles
            .get_mut(&user_id)
            .map(|mut p| p.remove_like(post_id))
            .unwrap_or(false))
    }

    async fn push_subscription(&self, subscriber: UserId, target: UserId) -> Result<bool> {
        let _guard = self.subscriptions.lock().await;
        // 两个档案可能落在同一分片，分两次加锁
        let changed = self.modify(subscriber, |p| {
            if p.is_subscribed_to(target) {
                false
            } else {
                p.subscribed_to.push(target);
                true
            }
        });
        if changed {
            self.modify(target, |p| {
                if !p.subscribers.contains(&subscriber) {
                    p.subscribers.push(subscriber);
                }
            });
        }
        Ok(changed)
    }

    async fn pull_subscription(&self, subscriber: UserId, target: UserId) -> Result<bool> {
        let _guard = self.subscriptions.lock().await;
        let changed = self.modify(subscriber, |p| {
            let before = p.subscribed_to.len();
            p.subscribed_to.retain(|id| *id != target);
            p.subscribed_to.len() != before
        });
        if changed {
            self.modify(target, |p| p.subscribers.retain(|id| *id != subscriber));
        }
        Ok(changed)
    }
}
