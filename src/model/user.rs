use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 身份目录中的数字用户 ID（文档存储的唯一主键）
pub type UserId = i64;

/// 身份记录（关系库 users 表）
///
/// 注册时创建，之后核心不修改，也不支持删除。
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct IdentityRecord {
    pub user_id: UserId,
    pub username: String,
    pub email: String,
    /// 密码哈希（bcrypt）
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// 待插入的用户
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

/// 通过 token 校验并完成身份解析的调用方
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
    pub username: String,
}
