//! 认证模型定义

use crate::hub::error::AuthError;
use serde::{Deserialize, Serialize};

/// 身份服务返回的登录会话
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSession {
    #[serde(rename = "userID")]
    pub user_id: String,
    pub email: String,
    /// Bearer token
    pub id_token: String,
    #[serde(default)]
    pub refresh_token: String,
    /// 过期时间（毫秒），0 表示不过期
    #[serde(default)]
    pub expires_at: i64,
}

impl AuthSession {
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at > 0 && self.expires_at <= now
    }
}

/// 注册请求
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub school_class: String,
}

/// 登录 / 注册请求体
#[derive(Debug, Serialize)]
pub struct CredentialsRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

pub const MIN_PASSWORD_LEN: usize = 6;

/// 规范化邮箱：去掉首尾空白并转小写，格式不正确时返回 InvalidEmail
pub fn normalize_email(email: &str) -> Result<String, AuthError> {
    let email = email.trim().to_lowercase();
    let Some((local, domain)) = email.split_once('@') else {
        return Err(AuthError::InvalidEmail);
    };
    let domain_ok = domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains('@');
    if local.is_empty() || !domain_ok || email.contains(char::is_whitespace) {
        return Err(AuthError::InvalidEmail);
    }
    Ok(email)
}
