//! 账号路由：/auth/*

use axum::{extract::State, http::HeaderMap, http::StatusCode, response::Json, routing::post, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::Result;
use crate::http::middleware::{client_ip, BearerToken, OptionalBearer};
use crate::http::AppState;
use crate::service::RegisterRequest;

#[derive(Debug, Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

pub fn create_route() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/renew_token", post(renew_token))
}

async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    let ip = client_ip(&headers);
    let user_id = state.auth.register(request, ip.as_deref()).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "User registered successfully", "user_id": user_id })),
    ))
}

async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    OptionalBearer(presented): OptionalBearer,
    Json(request): Json<LoginRequest>,
) -> Result<Json<Value>> {
    let ip = client_ip(&headers);
    let outcome = state
        .auth
        .login(&request.username, &request.password, presented.as_deref(), ip.as_deref())
        .await?;

    let message = if outcome.already_logged_in {
        "User already logged in"
    } else {
        "Login successful"
    };
    Ok(Json(json!({ "message": message, "token": outcome.token })))
}

async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    BearerToken(token): BearerToken,
) -> Result<Json<Value>> {
    let ip = client_ip(&headers);
    state.auth.logout(&token, ip.as_deref()).await?;
    Ok(Json(json!({ "message": "Logout successful" })))
}

async fn renew_token(State(state): State<AppState>, BearerToken(token): BearerToken) -> Result<Json<Value>> {
    let token = state.auth.renew_token(&token).await?;
    Ok(Json(json!({ "message": "Token renewed", "token": token })))
}
