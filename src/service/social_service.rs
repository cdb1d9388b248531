use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Result, ServerError};
use crate::model::profile::{ActivityEntry, HistoryUpdate, SocialProfile, UserInfo};
use crate::model::user::{AuthenticatedUser, UserId};
use crate::repository::{IdentityDirectory, PostStore, ProfileStore};
use crate::service::{parse_post_id, resolve_user_id};

/// 阅读记录与点赞列表
#[derive(Debug, Clone, Serialize)]
pub struct HistoryAndLikes {
    pub username: String,
    pub history: Vec<ActivityEntry>,
    pub likes: Vec<ActivityEntry>,
}

/// 社交服务：阅读记录、点赞、订阅
///
/// 身份一律先经身份目录解析为数字 ID；点赞与订阅的切换由存储层的条件写入完成，
/// 并发的重复请求只有一个会成功。
pub struct SocialService {
    profiles: Arc<dyn ProfileStore>,
    posts: Arc<dyn PostStore>,
    directory: Arc<dyn IdentityDirectory>,
}

impl SocialService {
    pub fn new(
        profiles: Arc<dyn ProfileStore>,
        posts: Arc<dyn PostStore>,
        directory: Arc<dyn IdentityDirectory>,
    ) -> Self {
        Self {
            profiles,
            posts,
            directory,
        }
    }

    async fn profile_of(&self, username: &str) -> Result<SocialProfile> {
        let user_id = resolve_user_id(self.directory.as_ref(), username).await?;
        self.profiles
            .get_profile(user_id)
            .await?
            .ok_or_else(|| ServerError::NotFound("Profile not found".to_string()))
    }

    async fn existing_post(&self, post_id: &str) -> Result<Uuid> {
        let id = parse_post_id(post_id)?;
        if self.posts.get_post(id).await?.is_none() {
            return Err(ServerError::NotFound("Post not found".to_string()));
        }
        Ok(id)
    }

    /// 冗余点赞数，失败只记录日志
    async fn adjust_like_count(&self, post_id: Uuid, delta: i64) {
        if let Err(e) = self.posts.adjust_like_count(post_id, delta).await {
            warn!("⚠️ 帖子点赞数更新失败 (post={}, delta={}): {}", post_id, delta, e);
        }
    }

    pub async fn get_history_like(&self, username: &str) -> Result<HistoryAndLikes> {
        let profile = self.profile_of(username).await?;
        Ok(HistoryAndLikes {
            username: username.to_string(),
            history: profile.history,
            likes: profile.likes,
        })
    }

    pub async fn add_read_history(&self, user: &AuthenticatedUser, post_id: &str) -> Result<HistoryUpdate> {
        let id = self.existing_post(post_id).await?;
        let update = self
            .profiles
            .push_history(user.user_id, &id.to_string(), Utc::now())
            .await?;
        debug!("阅读记录: user={}, post={}, {:?}", user.username, id, update);
        Ok(update)
    }

    pub async fn add_like(&self, user: &AuthenticatedUser, post_id: &str) -> Result<()> {
        let id = self.existing_post(post_id).await?;
        if !self
            .profiles
            .push_like(user.user_id, &id.to_string(), Utc::now())
            .await?
        {
            return Err(ServerError::Conflict("Post already liked".to_string()));
        }
        self.adjust_like_count(id, 1).await;
        info!("👍 点赞: user={}, post={}", user.username, id);
        Ok(())
    }

    pub async fn remove_like(&self, user: &AuthenticatedUser, post_id: &str) -> Result<()> {
        let id = parse_post_id(post_id)?;
        if !self.profiles.pull_like(user.user_id, &id.to_string()).await? {
            return Err(ServerError::NotFound("Like not found".to_string()));
        }
        self.adjust_like_count(id, -1).await;
        info!("取消点赞: user={}, post={}", user.username, id);
        Ok(())
    }

    async fn subscription_target(&self, user: &AuthenticatedUser, target: &str) -> Result<UserId> {
        let target_id = resolve_user_id(self.directory.as_ref(), target.trim()).await?;
        if target_id == user.user_id {
            return Err(ServerError::Validation("Cannot subscribe to yourself".to_string()));
        }
        Ok(target_id)
    }

    pub async fn subscribe(&self, user: &AuthenticatedUser, target: &str) -> Result<()> {
        let target_id = self.subscription_target(user, target).await?;
        if !self.profiles.push_subscription(user.user_id, target_id).await? {
            return Err(ServerError::Conflict("Already subscribed".to_string()));
        }
        info!("🔔 订阅: {} -> {}", user.username, target);
        Ok(())
    }

    pub async fn unsubscribe(&self, user: &AuthenticatedUser, target: &str) -> Result<()> {
        let target_id = self.subscription_target(user, target).await?;
        if !self.profiles.pull_subscription(user.user_id, target_id).await? {
            return Err(ServerError::NotFound("Subscription not found".to_string()));
        }
        info!("🔕 取消订阅: {} -> {}", user.username, target);
        Ok(())
    }

    pub async fn check_user_info(&self, username: &str) -> Result<UserInfo> {
        Ok(self.profile_of(username).await?.into())
    }
}
