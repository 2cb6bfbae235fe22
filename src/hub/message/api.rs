//! 消息 HTTP API 客户端

use crate::hub::http::ApiClient;
use crate::hub::message::models::Message;
use crate::hub::serialization::deserialize_null_default;
use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

/// 消息远端数据源
#[async_trait]
pub trait MessageRemote: Send + Sync {
    async fn fetch_messages(&self, conversation_id: &str) -> Result<Vec<Message>>;

    /// 发送消息，返回服务器确认后的版本（id 沿用客户端生成的 id）
    async fn send(&self, message: &Message) -> Result<Message>;

    async fn delete(&self, conversation_id: &str, message_id: &str) -> Result<()>;
}

#[derive(Deserialize)]
struct MessagesData {
    #[serde(default, deserialize_with = "deserialize_null_default")]
    messages: Vec<Message>,
}

#[derive(Deserialize)]
struct MessageData {
    message: Message,
}

/// 消息相关的 HTTP API 客户端
pub struct MessageApi {
    client: ApiClient,
}

impl MessageApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MessageRemote for MessageApi {
    async fn fetch_messages(&self, conversation_id: &str) -> Result<Vec<Message>> {
        let data: Option<MessagesData> = self
            .client
            .post(
                "/msg/get_messages",
                &json!({ "conversationID": conversation_id }),
                "获取消息列表",
            )
            .await?;
        let messages = data.map(|d| d.messages).unwrap_or_default();
        debug!(
            "[MsgAPI] 会话 {} 获取消息 {} 条",
            conversation_id,
            messages.len()
        );
        Ok(messages)
    }

    async fn send(&self, message: &Message) -> Result<Message> {
        let data: MessageData = self
            .client
            .post_data("/msg/send_msg", message, "发送消息")
            .await?;
        Ok(data.message)
    }

    async fn delete(&self, conversation_id: &str, message_id: &str) -> Result<()> {
        self.client
            .post_unit(
                "/msg/delete_msg",
                &json!({ "conversationID": conversation_id, "messageID": message_id }),
                "删除消息",
            )
            .await
    }
}
