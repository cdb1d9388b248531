//! 数据模型模块

pub mod post;
pub mod profile;
pub mod user;

pub use post::*;
pub use profile::*;
pub use user::*;
