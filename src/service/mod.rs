//! 业务服务层
//!
//! 所有写操作都先在身份目录中把用户名解析为数字用户 ID，再按 ID 写文档存储。

pub mod auth_service;
pub mod media_service;
pub mod post_service;
pub mod social_service;

pub use auth_service::{AuthService, LoginOutcome, RegisterRequest};
pub use media_service::{MediaService, MediaStore, MemoryMediaStore, OpendalMediaStore};
pub use post_service::{CreatePostRequest, PostService, MAX_PER_PAGE};
pub use social_service::SocialService;

use uuid::Uuid;

use crate::error::{Result, ServerError};
use crate::model::user::UserId;
use crate::repository::IdentityDirectory;

/// 用户名 → 数字用户 ID，未注册时返回 `NotFound`
pub(crate) async fn resolve_user_id(directory: &dyn IdentityDirectory, username: &str) -> Result<UserId> {
    directory
        .find_user_id(username)
        .await?
        .ok_or_else(|| ServerError::NotFound("User not found".to_string()))
}

pub(crate) fn parse_post_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw.trim()).map_err(|_| ServerError::Validation("Invalid post id".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::user::NewUser;
    use crate::repository::MemoryIdentityDirectory;

    #[tokio::test]
    async fn test_resolve_user_id() {
        let dir = MemoryIdentityDirectory::new();
        let id = dir
            .insert_user(NewUser {
                username: "alice".into(),
                email: "a@example.com".into(),
                password_hash: "x".into(),
            })
            .await
            .unwrap();

        assert_eq!(resolve_user_id(&dir, "alice").await.unwrap(), id);
        assert!(matches!(
            resolve_user_id(&dir, "bob").await.unwrap_err(),
            ServerError::NotFound(_)
        ));
    }

    #[test]
    fn test_parse_post_id() {
        let id = Uuid::new_v4();
        assert_eq!(parse_post_id(&format!(" {} ", id)).unwrap(), id);
        assert!(matches!(parse_post_id("nope"), Err(ServerError::Validation(_))));
    }
}
