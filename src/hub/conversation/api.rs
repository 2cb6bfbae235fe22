//! 会话 HTTP API 客户端

use crate::hub::conversation::models::Conversation;
use crate::hub::http::ApiClient;
use crate::hub::serialization::deserialize_null_default;
use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

/// 会话远端数据源
#[async_trait]
pub trait ConversationRemote: Send + Sync {
    /// 获取用户参与的所有会话（unreadCount 为该用户的未读数）
    async fn fetch_for_user(&self, user_id: &str) -> Result<Vec<Conversation>>;

    async fn create(&self, conversation: &Conversation) -> Result<Conversation>;

    async fn delete(&self, conversation_id: &str) -> Result<()>;

    async fn mark_read(&self, conversation_id: &str, user_id: &str) -> Result<()>;
}

#[derive(Deserialize)]
struct ConversationsData {
    #[serde(default, deserialize_with = "deserialize_null_default")]
    conversations: Vec<Conversation>,
}

#[derive(Deserialize)]
struct ConversationData {
    conversation: Conversation,
}

/// 会话相关的 HTTP API 客户端
pub struct ConversationApi {
    client: ApiClient,
}

impl ConversationApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ConversationRemote for ConversationApi {
    async fn fetch_for_user(&self, user_id: &str) -> Result<Vec<Conversation>> {
        let data: Option<ConversationsData> = self
            .client
            .post(
                "/conversation/get_all_conversations",
                &json!({ "ownerUserID": user_id }),
                "获取会话列表",
            )
            .await?;
        let list = data.map(|d| d.conversations).unwrap_or_default();
        info!("[ConvAPI] ✅ 用户 {} 的会话 {} 个", user_id, list.len());
        Ok(list)
    }

    async fn create(&self, conversation: &Conversation) -> Result<Conversation> {
        let data: ConversationData = self
            .client
            .post_data("/conversation/create", conversation, "创建会话")
            .await?;
        Ok(data.conversation)
    }

    async fn delete(&self, conversation_id: &str) -> Result<()> {
        self.client
            .post_unit(
                "/conversation/delete",
                &json!({ "conversationID": conversation_id }),
                "删除会话",
            )
            .await
    }

    async fn mark_read(&self, conversation_id: &str, user_id: &str) -> Result<()> {
        self.client
            .post_unit(
                "/conversation/mark_as_read",
                &json!({ "conversationID": conversation_id, "userID": user_id }),
                "标记会话已读",
            )
            .await
    }
}
