/// 密码哈希与校验（bcrypt）

use bcrypt::{hash, verify, DEFAULT_COST};

use crate::error::{Result, ServerError};

/// 密码加密成本（bcrypt 默认 12）
pub const PASSWORD_COST: u32 = DEFAULT_COST;

/// 指定成本加密（开发模式与测试使用较低成本）
pub fn hash_password_with_cost(password: &str, cost: u32) -> Result<String> {
    hash(password, cost).map_err(|e| ServerError::Internal(format!("密码加密失败: {}", e)))
}

/// 验证密码；哈希格式损坏视为不匹配
pub fn verify_password(password: &str, hash: &str) -> bool {
    match verify(password, hash) {
        Ok(ok) => ok,
        Err(e) => {
            tracing::warn!("密码哈希无法解析: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_password_correct_and_wrong() {
        let hash = hash_password_with_cost("secret123", 4).unwrap();
        assert!(hash.starts_with("$2b$"));
        assert!(verify_password("secret123", &hash));
        assert!(!verify_password("wrong_password", &hash));
    }

    #[test]
    fn test_same_password_different_hash() {
        let hash1 = hash_password_with_cost("secret123", 4).unwrap();
        let hash2 = hash_password_with_cost("secret123", 4).unwrap();
        assert_ne!(hash1, hash2);
    }

    #[test]
    fn test_malformed_hash_does_not_match() {
        assert!(!verify_password("secret123", "not-a-bcrypt-hash"));
    }
}
