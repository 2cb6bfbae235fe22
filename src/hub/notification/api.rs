//! 推送令牌 HTTP API 客户端

use crate::hub::http::ApiClient;
use crate::hub::notification::models::PushToken;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use tracing::info;

/// 推送令牌远端接口
#[async_trait]
pub trait PushTokenRemote: Send + Sync {
    async fn register(&self, token: &PushToken) -> Result<()>;

    async fn unregister(&self, user_id: &str, token: &str) -> Result<()>;
}

/// 推送令牌 HTTP API 客户端
pub struct PushTokenApi {
    client: ApiClient,
}

impl PushTokenApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PushTokenRemote for PushTokenApi {
    async fn register(&self, token: &PushToken) -> Result<()> {
        self.client
            .post_unit("/push/register_token", token, "上报推送令牌")
            .await?;
        info!("[PushAPI] ✅ 推送令牌已上报，userID: {}", token.user_id);
        Ok(())
    }

    async fn unregister(&self, user_id: &str, token: &str) -> Result<()> {
        self.client
            .post_unit(
                "/push/unregister_token",
                &json!({ "userID": user_id, "token": token }),
                "注销推送令牌",
            )
            .await
    }
}
