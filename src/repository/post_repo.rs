//! 帖子文档存储

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sqlx::types::Json;
use sqlx::PgPool;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use uuid::Uuid;

use crate::error::Result;
use crate::infra::with_store_timeout;
use crate::model::post::{Comment, NewPost, Page, Pagination, Post, PostFilter, PostUpdate};
use crate::model::user::UserId;

/// 帖子存储接口
#[async_trait]
pub trait PostStore: Send + Sync {
    async fn create_post(&self, post: NewPost) -> Result<Post>;

    async fn get_post(&self, post_id: Uuid) -> Result<Option<Post>>;

    /// 按创建时间倒序分页
    async fn list_posts(&self, filter: &PostFilter, page: u32, per_page: u32) -> Result<Page<Post>>;

    /// 只更新非空字段，返回帖子是否存在
    async fn update_post(&self, post_id: Uuid, update: &PostUpdate) -> Result<bool>;

    async fn delete_post(&self, post_id: Uuid) -> Result<bool>;

    /// 追加评论并把 comment_count 加一（同一次写入），返回帖子是否存在
    async fn add_comment(&self, post_id: Uuid, comment: Comment) -> Result<bool>;

    /// 调整冗余点赞数（不会低于 0）
    async fn adjust_like_count(&self, post_id: Uuid, delta: i64) -> Result<()>;

    async fn increment_read_count(&self, post_id: Uuid) -> Result<()>;
}

#[derive(sqlx::FromRow)]
struct PostRow {
    post_id: Uuid,
    user_id: i64,
    title: String,
    content: String,
    media_url: String,
    comments: Json<Vec<Comment>>,
    comment_count: i64,
    like_count: i64,
    read_count: i64,
    created_at: DateTime<Utc>,
}

impl From<PostRow> for Post {
    fn from(row: PostRow) -> Self {
        Self {
            post_id: row.post_id,
            user_id: row.user_id,
            title: row.title,
            content: row.content,
            media_url: row.media_url,
            comments: row.comments.0,
            comment_count: row.comment_count,
            like_count: row.like_count,
            read_count: row.read_count,
            created_at: row.created_at,
        }
    }
}

const POST_COLUMNS: &str =
    "post_id, user_id, title, content, media_url, comments, comment_count, like_count, read_count, created_at";

/// ILIKE 模式：转义通配符后两侧加 %
fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

/// PostgreSQL 帖子存储
#[derive(Clone)]
pub struct PgPostStore {
    pool: PgPool,
    timeout: Duration,
}

impl PgPostStore {
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }
}

#[async_trait]
impl PostStore for PgPostStore {
    async fn create_post(&self, post: NewPost) -> Result<Post> {
        with_store_timeout(self.timeout, "create_post", async {
            let row = sqlx::query_as::<_, PostRow>(&format!(
                r#"
                INSERT INTO posts (post_id, user_id, title, content, media_url)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING {POST_COLUMNS}
                "#
            ))
            .bind(Uuid::new_v4())
            .bind(post.user_id)
            .bind(&post.title)
            .bind(&post.content)
            .bind(&post.media_url)
            .fetch_one(&self.pool)
            .await?;
            Ok(row.into())
        })
        .await
    }

    async fn get_post(&self, post_id: Uuid) -> Result<Option<Post>> {
        with_store_timeout(self.timeout, "get_post", async {
            let row = sqlx::query_as::<_, PostRow>(&format!(
                "SELECT {POST_COLUMNS} FROM posts WHERE post_id = $1"
            ))
            .bind(post_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row.map(Post::from))
        })
        .await
    }

    async fn list_posts(&self, filter: &PostFilter, page: u32, per_page: u32) -> Result<Page<Post>> {
        with_store_timeout(self.timeout, "list_posts", async {
            let pattern = filter.search.as_deref().map(like_pattern);
            let where_clause = r#"
                WHERE ($1::BIGINT IS NULL OR user_id = $1)
                  AND ($2::TEXT IS NULL OR title ILIKE $2 OR content ILIKE $2)
            "#;

            let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM posts {where_clause}"))
                .bind(filter.user_id)
                .bind(pattern.as_deref())
                .fetch_one(&self.pool)
                .await?;

            let rows = sqlx::query_as::<_, PostRow>(&format!(
                "SELECT {POST_COLUMNS} FROM posts {where_clause} ORDER BY created_at DESC, post_id LIMIT $3 OFFSET $4"
            ))
            .bind(filter.user_id)
            .bind(pattern.as_deref())
            .bind(i64::from(per_page))
            .bind(Pagination::offset(page, per_page) as i64)
            .fetch_all(&self.pool)
            .await?;

            Ok(Page {
                posts: rows.into_iter().map(Post::from).collect(),
                pagination: Pagination::new(total.max(0) as u64, page, per_page),
            })
        })
        .await
    }

    async fn update_post(&self, post_id: Uuid, update: &PostUpdate) -> Result<bool> {
        with_store_timeout(self.timeout, "update_post", async {
            let result = sqlx::query(
                r#"
                UPDATE posts
                SET title = COALESCE($2, title),
                    content = COALESCE($3, content),
                    media_url = COALESCE($4, media_url)
                WHERE post_id = $1
                "#,
            )
            .bind(post_id)
            .bind(update.title.as_deref())
            .bind(update.content.as_deref())
            .bind(update.media_url.as_deref())
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() > 0)
        })
        .await
    }

    async fn delete_post(&self, post_id: Uuid) -> Result<bool> {
        with_store_timeout(self.timeout, "delete_post", async {
            let result = sqlx::query("DELETE FROM posts WHERE post_id = $1")
                .bind(post_id)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected() > 0)
        })
        .await
    }

    async fn add_comment(&self, post_id: Uuid, comment: Comment) -> Result<bool> {
        with_store_timeout(self.timeout, "add_comment", async {
            let result = sqlx::query(
                r#"
                UPDATE posts
                SET comments = comments || $2,
                    comment_count = comment_count + 1
                WHERE post_id = $1
                "#,
            )
            .bind(post_id)
            .bind(Json(vec![comment]))
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() > 0)
        })
        .await
    }

    async fn adjust_like_count(&self, post_id: Uuid, delta: i64) -> Result<()> {
        with_store_timeout(self.timeout, "adjust_like_count", async {
            sqlx::query("UPDATE posts SET like_count = GREATEST(like_count + $2, 0) WHERE post_id = $1")
                .bind(post_id)
                .bind(delta)
                .execute(&self.pool)
                .await?;
            Ok(())
        })
        .await
    }

    async fn increment_read_count(&self, post_id: Uuid) -> Result<()> {
        with_store_timeout(self.timeout, "increment_read_count", async {
            sqlx::query("UPDATE posts SET read_count = read_count + 1 WHERE post_id = $1")
                .bind(post_id)
                .execute(&self.pool)
                .await?;
            Ok(())
        })
        .await
    }
}

/// 内存帖子存储（开发模式与测试）
#[derive(Default)]
pub struct MemoryPostStore {
    /// (插入序号, 帖子)，序号用于同一时刻创建的帖子排序
    posts: DashMap<Uuid, (u64, Post)>,
    seq: AtomicU64,
}

impl MemoryPostStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 某用户的帖子数
    pub fn count_for(&self, user_id: UserId) -> usize {
        self.posts.iter().filter(|e| e.value().1.user_id == user_id).count()
    }
}

#[async_trait]
impl PostStore for MemoryPostStore {
    async fn create_post(&self, post: NewPost) -> Result<Post> {
        let created = Post {
            post_id: Uuid::new_v4(),
            user_id: post.user_id,
            title: post.title,
            content: post.content,
            media_url: post.media_url,
            comments: Vec::new(),
            comment_count: 0,
            like_count: 0,
            read_count: 0,
            created_at: Utc::now(),
        };
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        self.posts.insert(created.post_id, (seq, created.clone()));
        Ok(created)
    }

    async fn get_post(&self, post_id: Uuid) -> Result<Option<Post>> {
        Ok(self.posts.get(&post_id).map(|e| e.value().1.clone()))
    }

    async fn list_posts(&self, filter: &PostFilter, page: u32, per_page: u32) -> Result<Page<Post>> {
        let mut matched: Vec<(u64, Post)> = self
            .posts
            .iter()
            .filter(|e| filter.matches(&e.value().1))
            .map(|e| e.value().clone())
            .collect();
        matched.sort_by(|(seq_a, a), (seq_b, b)| {
            b.created_at.cmp(&a.created_at).then(seq_b.cmp(seq_a))
        });

        let total = matched.len() as u64;
        let offset = usize::try_from(Pagination::offset(page, per_page)).unwrap_or(usize::MAX);
        let posts = matched
            .into_iter()
            .skip(offset)
            .take(per_page as usize)
            .map(|(_, post)| post)
            .collect();

        Ok(Page {
            posts,
            pagination: Pagination::new(total, page, per_page),
        })
    }

    async fn update_post(&self, post_id: Uuid, update: &PostUpdate) -> Result<bool> {
        Ok(self
            .posts
            .get_mut(&post_id)
            .map(|mut e| update.apply(&mut e.value_mut().1))
            .is_some())
    }

    async fn delete_post(&self, post_id: Uuid) -> Result<bool> {
        Ok(self.posts.remove(&post_id).is_some())
    }

    async fn add_comment(&self, post_id: Uuid, comment: Comment) -> Result<bool> {
        Ok(self
            .posts
            .get_mut(&post_id)
            .map(|mut e| {
                let post = &mut e.value_mut().1;
                post.comments.push(comment);
                post.comment_count += 1;
            })
            .is_some())
    }

    async fn adjust_like_count(&self, post_id: Uuid, delta: i64) -> Result<()> {
        if let Some(mut e) = self.posts.get_mut(&post_id) {
            let post = &mut e.value_mut().1;
            post.like_count = (post.like_count + delta).max(0);
        }
        Ok(())
    }

    async fn increment_read_count(&self, post_id: Uuid) -> Result<()> {
        if let Some(mut e) = self.posts.get_mut(&post_id) {
            e.value_mut().1.read_count += 1;
        }
        Ok(())
    }
}
