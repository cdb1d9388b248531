//! 媒体上传：POST /posts/upload_media（multipart，字段 `file`）

use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::Json,
    routing::post,
    Router,
};
use axum_extra::extract::Multipart;

use crate::error::{Result, ServerError};
use crate::http::middleware::AuthUser;
use crate::http::AppState;
use crate::service::media_service::{UploadedMedia, MAX_MEDIA_BYTES};

/// multipart 头部等额外开销
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn create_route() -> Router<AppState> {
    Router::new()
        .route("/posts/upload_media", post(upload_media))
        .layer(DefaultBodyLimit::max(MAX_MEDIA_BYTES + MULTIPART_OVERHEAD))
}

async fn upload_media(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadedMedia>)> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::Validation(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| ServerError::Validation(format!("Failed to read file: {}", e)))?;

        let uploaded = state
            .media
            .upload(&user, filename.as_deref(), content_type.as_deref(), data.to_vec())
            .await?;
        return Ok((StatusCode::CREATED, Json(uploaded)));
    }

    Err(ServerError::Validation("Missing file field".to_string()))
}
