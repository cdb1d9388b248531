use crate::auth::clock::{Clock, SystemClock};
use crate::auth::models::{TokenClaims, TokenPayload, TokenVerdict};
use crate::error::{Result, ServerError};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use std::sync::Arc;
use uuid::Uuid;

/// JWT 签发和验证服务 (HS256 对称签名)
///
/// 无状态：结果只取决于密钥、claims 和时钟，不访问任何存储。
/// 过期判断在这里完成，会话层不需要自己跟踪时间。
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    clock: Arc<dyn Clock>,
}

impl JwtService {
    /// 使用系统时钟创建
    pub fn new(secret: &str) -> Self {
        Self::with_clock(secret, Arc::new(SystemClock))
    }

    /// 指定时钟创建（测试用手动时钟）
    pub fn with_clock(secret: &str, clock: Arc<dyn Clock>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // 过期由下面的 inspect 按注入的时钟判断，这里只校验签名与 exp 字段存在
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.leeway = 0;

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            clock,
        }
    }

    /// 当前时间（Unix 秒）
    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    /// 签发 token：复制载荷，附加 exp = now + ttl_seconds、iat、jti
    ///
    /// `ttl_seconds <= 0` 得到一个立即过期的 token，不报错。
    pub fn issue(&self, payload: &TokenPayload, ttl_seconds: i64) -> Result<String> {
        let now = self.clock.now();
        let claims = TokenClaims {
            username: payload.username.clone(),
            exp: now.saturating_add(ttl_seconds),
            iat: now,
            jti: Uuid::new_v4().to_string(),
            extra: payload.extra.clone(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| ServerError::Internal(format!("JWT 签发失败: {}", e)))
    }

    /// 校验签名与过期时间，返回三态结论
    pub fn inspect(&self, token: &str) -> TokenVerdict {
        let claims = match decode::<TokenClaims>(token, &self.decoding_key, &self.validation) {
            Ok(data) => data.claims,
            Err(e) => {
                tracing::debug!("JWT 校验失败: {}", e);
                return TokenVerdict::Invalid;
            }
        };

        if claims.exp <= self.clock.now() {
            TokenVerdict::Expired(claims)
        } else {
            TokenVerdict::Valid(claims)
        }
    }

    /// 验证 token：只有签名正确且未过期时返回 claims
    pub fn verify(&self, token: &str) -> Option<TokenClaims> {
        match self.inspect(token) {
            TokenVerdict::Valid(claims) => Some(claims),
            TokenVerdict::Expired(_) | TokenVerdict::Invalid => None,
        }
    }
}
