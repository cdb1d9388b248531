// 认证模块 - JWT 签发校验、撤销集合、会话管理、密码哈希

pub mod clock;
pub mod jwt_service;
pub mod models;
pub mod password;
pub mod session_manager;
pub mod token_revocation;

// 重新导出主要类型
pub use clock::{Clock, ManualClock, SystemClock};
pub use jwt_service::JwtService;
pub use models::{TokenClaims, TokenPayload, TokenVerdict};
pub use password::{hash_password_with_cost, verify_password, PASSWORD_COST};
pub use session_manager::SessionManager;
pub use token_revocation::{sweep_expired, MemoryRevocationStore, RedisRevocationStore, RevocationStore};
