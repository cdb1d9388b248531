use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Result, ServerError};
use crate::infra::ReadCounter;
use crate::model::post::{Comment, NewPost, Page, Post, PostFilter, PostUpdate};
use crate::model::user::{AuthenticatedUser, UserId};
use crate::repository::{IdentityDirectory, PostStore};
use crate::service::{parse_post_id, resolve_user_id};

/// 每页上限
pub const MAX_PER_PAGE: u32 = 100;

/// 创建帖子请求
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreatePostRequest {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub media_url: String,
}

/// 帖子服务
pub struct PostService {
    posts: Arc<dyn PostStore>,
    directory: Arc<dyn IdentityDirectory>,
    read_counter: Arc<ReadCounter>,
}

impl PostService {
    pub fn new(
        posts: Arc<dyn PostStore>,
        directory: Arc<dyn IdentityDirectory>,
        read_counter: Arc<ReadCounter>,
    ) -> Self {
        Self {
            posts,
            directory,
            read_counter,
        }
    }

    pub fn read_counter(&self) -> &Arc<ReadCounter> {
        &self.read_counter
    }

    pub async fn create_post(&self, user: &AuthenticatedUser, request: CreatePostRequest) -> Result<Post> {
        let title = request.title.trim();
        let content = request.content.trim();
        if title.is_empty() || content.is_empty() {
            return Err(ServerError::Validation("Title and content are required".to_string()));
        }

        let post = self
            .posts
            .create_post(NewPost {
                user_id: user.user_id,
                title: title.to_string(),
                content: content.to_string(),
                media_url: request.media_url.trim().to_string(),
            })
            .await?;

        info!("📝 帖子已创建: post={}, user={}", post.post_id, user.username);
        Ok(post)
    }

    /// 读取帖子（公开），并在后台记录一次阅读
    pub async fn get_post(&self, post_id: &str) -> Result<Post> {
        let id = parse_post_id(post_id)?;
        let post = self
            .posts
            .get_post(id)
            .await?
            .ok_or_else(|| ServerError::NotFound("Post not found".to_string()))?;

        self.read_counter.record_detached(id.to_string());
        let posts = Arc::clone(&self.posts);
        tokio::spawn(async move {
            if let Err(e) = posts.increment_read_count(id).await {
                warn!("⚠️ 帖子阅读数更新失败 (post={}): {}", id, e);
            }
        });

        Ok(post)
    }

    /// 分页列出帖子（公开），可按作者用户名与关键词过滤
    pub async fn list_posts(
        &self,
        author: Option<&str>,
        search: Option<&str>,
        page: u32,
        per_page: u32,
    ) -> Result<Page<Post>> {
        Self::check_paging(page, per_page)?;
        let user_id = match author.map(str::trim).filter(|a| !a.is_empty()) {
            Some(name) => Some(resolve_user_id(self.directory.as_ref(), name).await?),
            None => None,
        };
        self.list_filtered(user_id, search, page, per_page).await
    }

    /// 按作者数字 ID 过滤；ID 不存在时返回空页
    pub async fn list_posts_by_user_id(
        &self,
        user_id: UserId,
        search: Option<&str>,
        page: u32,
        per_page: u32,
    ) -> Result<Page<Post>> {
        Self::check_paging(page, per_page)?;
        self.list_filtered(Some(user_id), search, page, per_page).await
    }

    fn check_paging(page: u32, per_page: u32) -> Result<()> {
        if page == 0 || per_page == 0 {
            return Err(ServerError::Validation(
                "page and per_page must be positive".to_string(),
            ));
        }
        Ok(())
    }

    async fn list_filtered(
        &self,
        user_id: Option<UserId>,
        search: Option<&str>,
        page: u32,
        per_page: u32,
    ) -> Result<Page<Post>> {
        let filter = PostFilter {
            user_id,
            search: search.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string),
        };

        let page = self.posts.list_posts(&filter, page, per_page.min(MAX_PER_PAGE)).await?;
        debug!(
            "帖子列表: total={}, page={}/{}",
            page.pagination.total, page.pagination.page, page.pagination.pages
        );
        Ok(page)
    }

    /// 只有作者可以修改
    pub async fn update_post(&self, user: &AuthenticatedUser, post_id: &str, update: PostUpdate) -> Result<Post> {
        let id = parse_post_id(post_id)?;
        let update = update.normalized();
        if update.is_empty() {
            return Err(ServerError::Validation("Nothing to update".to_string()));
        }

        self.owned_post(user, id).await?;
        if !self.posts.update_post(id, &update).await? {
            return Err(ServerError::NotFound("Post not found".to_string()));
        }

        info!("✏️ 帖子已更新: post={}, user={}", id, user.username);
        self.posts
            .get_post(id)
            .await?
            .ok_or_else(|| ServerError::NotFound("Post not found".to_string()))
    }

    /// 只有作者可以删除
    pub async fn delete_post(&self, user: &AuthenticatedUser, post_id: &str) -> Result<()> {
        let id = parse_post_id(post_id)?;
        self.owned_post(user, id).await?;
        if !self.posts.delete_post(id).await? {
            return Err(ServerError::NotFound("Post not found".to_string()));
        }
        info!("🗑️ 帖子已删除: post={}, user={}", id, user.username);
        Ok(())
    }

    pub async fn create_comment(&self, user: &AuthenticatedUser, post_id: &str, text: &str) -> Result<Comment> {
        let id = parse_post_id(post_id)?;
        let text = text.trim();
        if text.is_empty() {
            return Err(ServerError::Validation("Comment is required".to_string()));
        }

        let comment = Comment {
            comment_id: Uuid::new_v4(),
            user_id: user.user_id,
            comment: text.to_string(),
            created_at: Utc::now(),
        };
        if !self.posts.add_comment(id, comment.clone()).await? {
            return Err(ServerError::NotFound("Post not found".to_string()));
        }

        debug!("💬 评论已添加: post={}, user={}", id, user.username);
        Ok(comment)
    }

    async fn owned_post(&self, user: &AuthenticatedUser, id: Uuid) -> Result<Post> {
        let post = self
            .posts
            .get_post(id)
            .await?
            .ok_or_else(|| ServerError::NotFound("Post not found".to_string()))?;
        if post.user_id != user.user_id {
            warn!("⚠️ 非作者尝试修改帖子: post={}, user={}", id, user.username);
            return Err(ServerError::Forbidden("Not the author of this post".to_string()));
        }
        Ok(post)
    }
}
