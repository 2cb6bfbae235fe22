//! 消息监听器回调接口

use crate::hub::message::models::Message;
use async_trait::async_trait;

/// 消息监听器
#[async_trait]
pub trait MessageListener: Send + Sync {
    /// 消息新增或状态变更（包括自己发送的消息）
    async fn on_messages_changed(&self, conversation_id: String, messages: Vec<Message>);

    async fn on_messages_deleted(&self, conversation_id: String, ids: Vec<String>);

    /// 实时收到的新消息
    async fn on_new_messages(&self, messages: Vec<Message>);

    /// 同步失败（本地缓存保持不变）
    async fn on_sync_failed(&self, conversation_id: String, reason: String);
}

/// 空实现（默认监听器）
pub struct EmptyMessageListener;

#[async_trait]
impl MessageListener for EmptyMessageListener {
    async fn on_messages_changed(&self, _conversation_id: String, _messages: Vec<Message>) {}
    async fn on_messages_deleted(&self, _conversation_id: String, _ids: Vec<String>) {}
    async fn on_new_messages(&self, _messages: Vec<Message>) {}
    async fn on_sync_failed(&self, _conversation_id: String, _reason: String) {}
}
