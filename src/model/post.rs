use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::user::UserId;

/// 帖子下的评论（内嵌在帖子文档中）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub comment_id: Uuid,
    pub user_id: UserId,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

/// 帖子文档
///
/// comment_count / like_count / read_count 是尽力而为的冗余计数，
/// 与计数缓存中的阅读数不做对账。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub post_id: Uuid,
    pub user_id: UserId,
    pub title: String,
    pub content: String,
    pub media_url: String,
    pub comments: Vec<Comment>,
    pub comment_count: i64,
    pub like_count: i64,
    pub read_count: i64,
    pub created_at: DateTime<Utc>,
}

/// 创建帖子
#[derive(Debug, Clone)]
pub struct NewPost {
    pub user_id: UserId,
    pub title: String,
    pub content: String,
    pub media_url: String,
}

/// 更新帖子：只更新非空字段
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostUpdate {
    pub title: Option<String>,
    pub content: Option<String>,
    pub media_url: Option<String>,
}

impl PostUpdate {
    /// 去掉首尾空白，空字符串视为未提供
    pub fn normalized(self) -> Self {
        fn keep(v: Option<String>) -> Option<String> {
            v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
        }
        Self {
            title: keep(self.title),
            content: keep(self.content),
            media_url: keep(self.media_url),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.content.is_none() && self.media_url.is_none()
    }

    /// 应用到已有帖子（内存存储使用）
    pub fn apply(&self, post: &mut Post) {
        if let Some(title) = &self.title {
            post.title = title.clone();
        }
        if let Some(content) = &self.content {
            post.content = content.clone();
        }
        if let Some(media_url) = &self.media_url {
            post.media_url = media_url.clone();
        }
    }
}

/// 帖子列表过滤条件
#[derive(Debug, Clone, Default)]
pub struct PostFilter {
    pub user_id: Option<UserId>,
    /// 标题或正文包含该词（不区分大小写）
    pub search: Option<String>,
}

impl PostFilter {
    /// 内存存储使用的匹配逻辑，与 SQL 的 ILIKE 一致
    pub fn matches(&self, post: &Post) -> bool {
        if let Some(user_id) = self.user_id {
            if post.user_id != user_id {
                return false;
            }
        }
        match &self.search {
            Some(term) => {
                let term = term.to_lowercase();
                post.title.to_lowercase().contains(&term) || post.content.to_lowercase().contains(&term)
            }
            None => true,
        }
    }
}

/// 分页信息
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
    pub pages: u64,
}

impl Pagination {
    pub fn new(total: u64, page: u32, per_page: u32) -> Self {
        let per_page_u64 = u64::from(per_page.max(1));
        Self {
            total,
            page,
            per_page,
            pages: total.div_ceil(per_page_u64),
        }
    }

    /// 本页的偏移量
    pub fn offset(page: u32, per_page: u32) -> u64 {
        u64::from(page.saturating_sub(1)) * u64::from(per_page)
    }
}

/// 一页结果
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub posts: Vec<T>,
    pub pagination: Pagination,
}
