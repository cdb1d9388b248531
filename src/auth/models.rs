use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 调用方提供的 token 载荷（签发前）
///
/// `username` 是核心唯一依赖的字段；其余字段原样写入 token。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenPayload {
    pub username: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TokenPayload {
    pub fn for_user(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            extra: Map::new(),
        }
    }

    pub fn with_claim(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

/// 签名后的 JWT Claims
///
/// 只签名不加密，持有者可以看到全部内容。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// 用户名
    pub username: String,
    /// JWT 标准字段 - 过期时间 (Unix timestamp)
    pub exp: i64,
    /// JWT 标准字段 - 签发时间
    pub iat: i64,
    /// JWT 标准字段 - JWT ID，保证每次签发的 token 字符串不同
    pub jti: String,
    /// 调用方附加字段
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TokenClaims {
    /// 去掉签发时附加的 exp / iat / jti，还原调用方载荷（续期时复用）
    pub fn payload(&self) -> TokenPayload {
        TokenPayload {
            username: self.username.clone(),
            extra: self.extra.clone(),
        }
    }
}

/// 单个 token 的校验结论
#[derive(Debug, Clone, PartialEq)]
pub enum TokenVerdict {
    /// 签名正确且未过期
    Valid(TokenClaims),
    /// 签名正确但已过期
    Expired(TokenClaims),
    /// 格式错误或签名不匹配
    Invalid,
}
