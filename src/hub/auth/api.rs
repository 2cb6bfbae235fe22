//! 身份服务 HTTP 客户端
//!
//! 身份服务的错误通过 errMsg 携带错误码字符串（如 `INVALID_PASSWORD`），在这里统一映射为 [`AuthError`]。

use crate::hub::auth::models::{AuthSession, CredentialsRequest};
use crate::hub::error::{ApiError, AuthError};
use crate::hub::http::ApiClient;
use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info};

/// 身份服务（登录、注册、令牌刷新）
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, AuthError>;

    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthSession, AuthError>;

    async fn sign_out(&self, session: &AuthSession) -> Result<(), AuthError>;

    async fn refresh(&self, refresh_token: &str) -> Result<AuthSession, AuthError>;

    async fn send_password_reset(&self, email: &str) -> Result<(), AuthError>;

    async fn delete_account(&self, session: &AuthSession) -> Result<(), AuthError>;
}

/// 将 HTTP 层错误映射为认证错误
pub fn map_auth_error(e: anyhow::Error) -> AuthError {
    match e.downcast::<ApiError>() {
        Ok(ApiError::Business { message, .. }) => AuthError::from_provider_code(&message),
        Ok(ApiError::Unauthorized) => AuthError::InvalidCredentials,
        Ok(other) => AuthError::Network(other),
        Err(e) => AuthError::Unknown(format!("{:#}", e)),
    }
}

/// 身份服务的 HTTP 实现
pub struct AuthApi {
    client: ApiClient,
}

impl AuthApi {
    /// `client` 不需要认证头
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl IdentityProvider for AuthApi {
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, AuthError> {
        info!("[AuthAPI] 🔐 正在登录: {}", email);
        let session: AuthSession = self
            .client
            .post_data("/auth/sign_in", &CredentialsRequest { email, password }, "登录")
            .await
            .map_err(map_auth_error)?;
        debug!("[AuthAPI] ✅ 登录成功，userID: {}", session.user_id);
        Ok(session)
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthSession, AuthError> {
        info!("[AuthAPI] 📝 正在注册: {}", email);
        self.client
            .post_data("/auth/sign_up", &CredentialsRequest { email, password }, "注册")
            .await
            .map_err(map_auth_error)
    }

    async fn sign_out(&self, session: &AuthSession) -> Result<(), AuthError> {
        self.client
            .post_unit(
                "/auth/sign_out",
                &json!({ "refreshToken": session.refresh_token }),
                "退出登录",
            )
            .await
            .map_err(map_auth_error)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<AuthSession, AuthError> {
        debug!("[AuthAPI] 🔄 刷新令牌");
        self.client
            .post_data(
                "/auth/refresh",
                &json!({ "refreshToken": refresh_token }),
                "刷新令牌",
            )
            .await
            .map_err(map_auth_error)
    }

    async fn send_password_reset(&self, email: &str) -> Result<(), AuthError> {
        self.client
            .post_unit("/auth/password_reset", &json!({ "email": email }), "重置密码")
            .await
            .map_err(map_auth_error)
    }

    async fn delete_account(&self, session: &AuthSession) -> Result<(), AuthError> {
        self.client
            .post_unit(
                "/auth/delete_account",
                &json!({ "idToken": session.id_token }),
                "注销账号",
            )
            .await
            .map_err(map_auth_error)
    }
}
