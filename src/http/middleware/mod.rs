pub mod auth;

pub use auth::{bearer_token, client_ip, AuthUser, BearerToken, OptionalBearer};
