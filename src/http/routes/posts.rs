//! 帖子路由：/posts/*

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get, post, put},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::Result;
use crate::http::middleware::AuthUser;
use crate::http::AppState;
use crate::model::post::{Comment, Page, Post, PostUpdate};
use crate::model::user::UserId;
use crate::service::CreatePostRequest;

fn default_page() -> u32 {
    1
}

fn default_per_page() -> u32 {
    10
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    #[serde(default = "default_page")]
    page: u32,
    #[serde(default = "default_per_page")]
    per_page: u32,
    /// 只看某个作者（数字 ID 优先于用户名）
    user_id: Option<UserId>,
    username: Option<String>,
    search: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PostIdQuery {
    post_id: String,
}

#[derive(Debug, Deserialize)]
struct UpdatePostRequest {
    post_id: String,
    #[serde(flatten)]
    update: PostUpdate,
}

#[derive(Debug, Deserialize)]
struct CommentRequest {
    post_id: String,
    comment: String,
}

pub fn create_route() -> Router<AppState> {
    Router::new()
        .route("/posts/create_post", post(create_post))
        .route("/posts/get_posts", get(get_posts))
        .route("/posts/get_post", get(get_post))
        .route("/posts/update_post", put(update_post))
        .route("/posts/delete_post", delete(delete_post))
        .route("/posts/create_comment", post(create_comment))
}

async fn create_post(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(request): Json<CreatePostRequest>,
) -> Result<(StatusCode, Json<Post>)> {
    let post = state.posts.create_post(&user, request).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

async fn get_posts(State(state): State<AppState>, Query(query): Query<ListQuery>) -> Result<Json<Page<Post>>> {
    let search = query.search.as_deref();
    let page = match query.user_id {
        Some(user_id) => {
            state
                .posts
                .list_posts_by_user_id(user_id, search, query.page, query.per_page)
                .await?
        }
        None => {
            state
                .posts
                .list_posts(query.username.as_deref(), search, query.page, query.per_page)
                .await?
        }
    };
    Ok(Json(page))
}

async fn get_post(State(state): State<AppState>, Query(query): Query<PostIdQuery>) -> Result<Json<Post>> {
    Ok(Json(state.posts.get_post(&query.post_id).await?))
}

async fn update_post(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(request): Json<UpdatePostRequest>,
) -> Result<Json<Post>> {
    let post = state
        .posts
        .update_post(&user, &request.post_id, request.update)
        .await?;
    Ok(Json(post))
}

async fn delete_post(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(query): Query<PostIdQuery>,
) -> Result<Json<Value>> {
    state.posts.delete_post(&user, &query.post_id).await?;
    Ok(Json(json!({ "message": "Post deleted" })))
}

async fn create_comment(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(request): Json<CommentRequest>,
) -> Result<(StatusCode, Json<Comment>)> {
    let comment = state
        .posts
        .create_comment(&user, &request.post_id, &request.comment)
        .await?;
    Ok((StatusCode::CREATED, Json(comment)))
}
