//! 领域错误类型
//!
//! 远端适配层（HTTP / 身份服务）在边界处把 reqwest 错误、HTTP 状态码和服务端错误码
//! 统一映射为这里的枚举，再交给上层（仓库 / 视图模型）渲染提示文案。

use reqwest::StatusCode;
use thiserror::Error;

/// 网络与服务端错误
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("网络不可达: {0}")]
    Unreachable(String),

    #[error("请求超时")]
    Timeout,

    #[error("请求过于频繁，请稍后再试")]
    TooManyRequests,

    #[error("未授权或登录已过期")]
    Unauthorized,

    #[error("服务器错误 {status}: {message}")]
    Server { status: u16, message: String },

    #[error("业务错误 {code}: {message}")]
    Business { code: i32, message: String },

    #[error("解析响应失败: {0}")]
    Decode(String),
}

impl ApiError {
    /// 根据 HTTP 状态码映射错误（仅在非 2xx 时调用）
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiError::Unauthorized,
            StatusCode::TOO_MANY_REQUESTS => ApiError::TooManyRequests,
            StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => ApiError::Timeout,
            _ => ApiError::Server {
                status: status.as_u16(),
                message: body.to_string(),
            },
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ApiError::Timeout
        } else if e.is_connect() || e.is_request() {
            ApiError::Unreachable(e.to_string())
        } else if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            ApiError::from_status(status, &e.to_string())
        } else {
            ApiError::Unreachable(e.to_string())
        }
    }
}

/// 认证相关错误
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("邮箱或密码错误")]
    InvalidCredentials,

    #[error("邮箱格式不正确")]
    InvalidEmail,

    #[error("密码强度不足")]
    WeakPassword,

    #[error("该账号已被停用")]
    UserDisabled,

    #[error("该邮箱已被注册")]
    EmailAlreadyInUse,

    #[error("用户不存在")]
    UserNotFound,

    #[error("该邮箱不在允许注册的名单中")]
    Forbidden,

    #[error("当前未登录")]
    NotSignedIn,

    #[error(transparent)]
    Network(#[from] ApiError),

    #[error("未知认证错误: {0}")]
    Unknown(String),
}

impl AuthError {
    /// 将身份服务返回的错误码映射为领域错误
    pub fn from_provider_code(code: &str) -> Self {
        match code.trim().to_ascii_uppercase().as_str() {
            "INVALID_CREDENTIALS" | "INVALID_PASSWORD" | "WRONG_PASSWORD" => {
                AuthError::InvalidCredentials
            }
            "EMAIL_NOT_FOUND" | "USER_NOT_FOUND" => AuthError::UserNotFound,
            "INVALID_EMAIL" => AuthError::InvalidEmail,
            "WEAK_PASSWORD" => AuthError::WeakPassword,
            "USER_DISABLED" => AuthError::UserDisabled,
            "EMAIL_EXISTS" | "EMAIL_ALREADY_IN_USE" => AuthError::EmailAlreadyInUse,
            "EMAIL_NOT_ALLOWED" | "FORBIDDEN" => AuthError::Forbidden,
            "TOO_MANY_ATTEMPTS_TRY_LATER" | "TOO_MANY_REQUESTS" => {
                AuthError::Network(ApiError::TooManyRequests)
            }
            "NETWORK_REQUEST_FAILED" => {
                AuthError::Network(ApiError::Unreachable(code.to_string()))
            }
            other => AuthError::Unknown(other.to_string()),
        }
    }

    /// 从 anyhow 错误链中还原领域错误（仓库层用 anyhow 传递）
    pub fn from_anyhow(e: anyhow::Error) -> Self {
        if let Some(auth) = e.downcast_ref::<AuthError>() {
            return auth.clone();
        }
        match e.downcast::<ApiError>() {
            Ok(api) => AuthError::Network(api),
            Err(e) => AuthError::Unknown(format!("{:#}", e)),
        }
    }
}

/// 输入校验错误（创建公告 / 任务 / 消息时的本地校验）
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} 不能为空")]
    Empty(&'static str),

    #[error("{field} 超出长度限制（最多 {max} 个字符）")]
    TooLong { field: &'static str, max: usize },

    #[error("{0}")]
    Invalid(String),
}

/// 任务报名相关错误
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MissionError {
    #[error("任务不存在: {0}")]
    NotFound(String),

    #[error("任务名额已满")]
    Full,

    #[error("任务尚未发布，无法报名")]
    NotPublished,
}

/// 校验必填文本字段，返回去掉首尾空白的内容
pub fn require_text(field: &'static str, value: &str, max: usize) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty(field));
    }
    if trimmed.chars().count() > max {
        return Err(ValidationError::TooLong { field, max });
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_codes_map_to_domain_errors() {
        assert_eq!(
            AuthError::from_provider_code("INVALID_PASSWORD"),
            AuthError::InvalidCredentials
        );
        assert_eq!(
            AuthError::from_provider_code("user_disabled"),
            AuthError::UserDisabled
        );
        assert_eq!(
            AuthError::from_provider_code("EMAIL_EXISTS"),
            AuthError::EmailAlreadyInUse
        );
        assert_eq!(
            AuthError::from_provider_code("TOO_MANY_ATTEMPTS_TRY_LATER"),
            AuthError::Network(ApiError::TooManyRequests)
        );
        assert!(matches!(
            AuthError::from_provider_code("SOMETHING_NEW"),
            AuthError::Unknown(_)
        ));
    }

    #[test]
    fn status_codes_map_to_api_errors() {
        assert_eq!(
            ApiError::from_status(StatusCode::TOO_MANY_REQUESTS, ""),
            ApiError::TooManyRequests
        );
        assert_eq!(
            ApiError::from_status(StatusCode::UNAUTHORIZED, ""),
            ApiError::Unauthorized
        );
        assert_eq!(
            ApiError::from_status(StatusCode::BAD_GATEWAY, "down"),
            ApiError::Server {
                status: 502,
                message: "down".to_string()
            }
        );
    }

    #[test]
    fn anyhow_roundtrip_keeps_api_error() {
        let err = anyhow::Error::new(ApiError::Timeout).context("登录失败");
        assert_eq!(AuthError::from_anyhow(err), AuthError::Network(ApiError::Timeout));
    }

    #[test]
    fn require_text_trims_and_checks_length() {
        assert_eq!(require_text("标题", "  运动会  ", 10).unwrap(), "运动会");
        assert_eq!(require_text("标题", "   ", 10), Err(ValidationError::Empty("标题")));
        assert!(matches!(
            require_text("标题", "abcdef", 3),
            Err(ValidationError::TooLong { max: 3, .. })
        ));
    }
}
