//! 用户 HTTP API 客户端

use crate::hub::http::ApiClient;
use crate::hub::serialization::deserialize_null_default;
use crate::hub::user::models::User;
use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

/// 用户远端数据源
#[async_trait]
pub trait UserRemote: Send + Sync {
    /// 获取用户资料，不存在时返回 None
    async fn get_user(&self, user_id: &str) -> Result<Option<User>>;

    /// 批量获取用户资料（不存在的 id 被忽略）
    async fn get_users(&self, user_ids: &[String]) -> Result<Vec<User>>;

    /// 创建用户资料，返回服务器保存后的版本
    async fn create_user(&self, user: &User) -> Result<User>;

    /// 更新用户资料，返回服务器保存后的版本
    async fn update_user(&self, user: &User) -> Result<User>;

    async fn delete_user(&self, user_id: &str) -> Result<()>;

    /// 邮箱是否在允许注册的名单中
    async fn is_email_allowed(&self, email: &str) -> Result<bool>;
}

#[derive(Deserialize)]
struct UserData {
    #[serde(default)]
    user: Option<User>,
}

#[derive(Deserialize)]
struct UsersData {
    #[serde(default, deserialize_with = "deserialize_null_default")]
    users: Vec<User>,
}

#[derive(Deserialize)]
struct AllowedData {
    allowed: bool,
}

/// 用户相关的 HTTP API 客户端
pub struct UserApi {
    client: ApiClient,
}

impl UserApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl UserRemote for UserApi {
    async fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        debug!("[UserAPI] 📡 获取用户资料: {}", user_id);
        let data: Option<UserData> = self
            .client
            .post("/user/get_user", &json!({ "userID": user_id }), "获取用户资料")
            .await?;
        Ok(data.and_then(|d| d.user))
    }

    async fn get_users(&self, user_ids: &[String]) -> Result<Vec<User>> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }
        let data: Option<UsersData> = self
            .client
            .post("/user/get_users", &json!({ "userIDs": user_ids }), "批量获取用户")
            .await?;
        let users = data.map(|d| d.users).unwrap_or_default();
        debug!("[UserAPI] 批量获取用户 {} 个，返回 {} 个", user_ids.len(), users.len());
        Ok(users)
    }

    async fn create_user(&self, user: &User) -> Result<User> {
        info!("[UserAPI] 📡 创建用户资料: {}", user.id);
        let data: UserData = self
            .client
            .post_data("/user/create", user, "创建用户资料")
            .await?;
        Ok(data.user.unwrap_or_else(|| user.clone()))
    }

    async fn update_user(&self, user: &User) -> Result<User> {
        info!("[UserAPI] 📡 更新用户资料: {}", user.id);
        let data: Option<UserData> = self
            .client
            .post("/user/update", user, "更新用户资料")
            .await?;
        Ok(data.and_then(|d| d.user).unwrap_or_else(|| user.clone()))
    }

    async fn delete_user(&self, user_id: &str) -> Result<()> {
        info!("[UserAPI] 📡 删除用户: {}", user_id);
        self.client
            .post_unit("/user/delete", &json!({ "userID": user_id }), "删除用户")
            .await
    }

    async fn is_email_allowed(&self, email: &str) -> Result<bool> {
        let data: AllowedData = self
            .client
            .post_data(
                "/user/check_allowed_email",
                &json!({ "email": email }),
                "校验注册名单",
            )
            .await?;
        debug!("[UserAPI] 邮箱 {} 是否允许注册: {}", email, data.allowed);
        Ok(data.allowed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn api_for(server: &MockServer) -> UserApi {
        UserApi::new(ApiClient::new(
            reqwest::Client::new(),
            server.uri(),
            Duration::from_secs(5),
        ))
    }

    #[tokio::test]
    async fn missing_profile_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/user/get_user"))
            .and(body_json(json!({ "userID": "ghost" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "errCode": 0, "errMsg": "", "data": { "user": null }
            })))
            .mount(&server)
            .await;

        assert!(api_for(&server).get_user("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn allow_list_check_reads_flag() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/user/check_allowed_email"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "errCode": 0, "errMsg": "", "data": { "allowed": false }
            })))
            .mount(&server)
            .await;

        assert!(!api_for(&server)
            .is_email_allowed("stranger@gmail.test")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn null_user_list_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/user/get_users"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "errCode": 0, "errMsg": "", "data": { "users": null }
            })))
            .mount(&server)
            .await;

        let users = api_for(&server)
            .get_users(&["a".to_string()])
            .await
            .unwrap();
        assert!(users.is_empty());
    }
}
