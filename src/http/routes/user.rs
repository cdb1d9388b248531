//! 订阅与用户信息：/user/*

use axum::{
    extract::{Query, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::Result;
use crate::http::middleware::AuthUser;
use crate::http::AppState;
use crate::model::profile::UserInfo;

#[derive(Debug, Deserialize)]
struct TargetUser {
    username: String,
}

pub fn create_route() -> Router<AppState> {
    Router::new()
        .route("/user/subscribe", post(subscribe))
        .route("/user/unsubscribe", post(unsubscribe))
        .route("/user/check_user_info", get(check_user_info))
}

async fn subscribe(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(target): Json<TargetUser>,
) -> Result<Json<Value>> {
    state.social.subscribe(&user, &target.username).await?;
    Ok(Json(json!({ "message": "Subscribed successfully" })))
}

async fn unsubscribe(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(target): Json<TargetUser>,
) -> Result<Json<Value>> {
    state.social.unsubscribe(&user, &target.username).await?;
    Ok(Json(json!({ "message": "Unsubscribed successfully" })))
}

async fn check_user_info(
    State(state): State<AppState>,
    Query(target): Query<TargetUser>,
) -> Result<Json<UserInfo>> {
    Ok(Json(state.social.check_user_info(&target.username).await?))
}
