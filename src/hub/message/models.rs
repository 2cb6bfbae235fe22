//! 消息模型定义

use crate::hub::reconcile::Identifiable;
use crate::hub::types::SendState;
use serde::{Deserialize, Serialize};

/// 文本消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    #[serde(rename = "conversationID")]
    pub conversation_id: String,
    #[serde(rename = "senderID")]
    pub sender_id: String,
    pub content: String,
    pub sent_at: i64,
    /// 服务器返回的消息不带该字段，视为已发送
    #[serde(default)]
    pub state: SendState,
}

impl Message {
    /// 消息列表里的预览文本（单行，最多 80 个字符）
    pub fn preview(&self) -> String {
        let line = self.content.lines().next().unwrap_or_default().trim();
        let mut preview: String = line.chars().take(80).collect();
        if line.chars().count() > 80 || self.content.trim().lines().count() > 1 {
            preview.push('…');
        }
        preview
    }
}

impl Identifiable for Message {
    fn id(&self) -> &str {
        &self.id
    }
}
