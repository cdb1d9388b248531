//! 存储层：身份目录（关系表）与文档存储（JSONB）
//!
//! 每个接口都有 PostgreSQL 实现和内存实现，内存实现用于 `--dev` 与测试。

pub mod post_repo;
pub mod profile_repo;
pub mod user_repo;

pub use post_repo::{MemoryPostStore, PgPostStore, PostStore};
pub use profile_repo::{MemoryProfileStore, PgProfileStore, ProfileStore};
pub use user_repo::{IdentityDirectory, MemoryIdentityDirectory, PgIdentityDirectory};
