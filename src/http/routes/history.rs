//! 阅读记录与点赞：/history/*

use axum::{
    extract::{Query, State},
    response::Json,
    routing::{delete, get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::Result;
use crate::http::middleware::AuthUser;
use crate::http::AppState;
use crate::model::profile::HistoryUpdate;
use crate::service::social_service::HistoryAndLikes;

#[derive(Debug, Deserialize)]
struct UserQuery {
    /// 不填时查看自己
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PostIdBody {
    post_id: String,
}

pub fn create_route() -> Router<AppState> {
    Router::new()
        .route("/history/get_history_like", get(get_history_like))
        .route("/history/add_read_history", post(add_read_history))
        .route("/history/add_like", post(add_like))
        .route("/history/remove_like", delete(remove_like))
}

async fn get_history_like(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(query): Query<UserQuery>,
) -> Result<Json<HistoryAndLikes>> {
    let username = query
        .username
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .unwrap_or(&user.username);
    Ok(Json(state.social.get_history_like(username).await?))
}

async fn add_read_history(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(body): Json<PostIdBody>,
) -> Result<Json<Value>> {
    let message = match state.social.add_read_history(&user, &body.post_id).await? {
        HistoryUpdate::Added => "History added",
        HistoryUpdate::TimestampUpdated => "History timestamp updated",
    };
    Ok(Json(json!({ "message": message })))
}

async fn add_like(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(body): Json<PostIdBody>,
) -> Result<Json<Value>> {
    state.social.add_like(&user, &body.post_id).await?;
    Ok(Json(json!({ "message": "Like added" })))
}

async fn remove_like(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(query): Query<PostIdBody>,
) -> Result<Json<Value>> {
    state.social.remove_like(&user, &query.post_id).await?;
    Ok(Json(json!({ "message": "Like removed" })))
}
