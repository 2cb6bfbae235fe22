//! 会话监听器回调接口

use crate::hub::conversation::models::Conversation;
use async_trait::async_trait;

/// 会话监听器
#[async_trait]
pub trait ConversationListener: Send + Sync {
    async fn on_conversations_changed(&self, conversations: Vec<Conversation>);

    async fn on_conversations_deleted(&self, ids: Vec<String>);

    /// 总未读数变化
    async fn on_total_unread_changed(&self, total: u32);

    async fn on_sync_failed(&self, reason: String);
}

/// 空实现（默认监听器）
pub struct EmptyConversationListener;

#[async_trait]
impl ConversationListener for EmptyConversationListener {
    async fn on_conversations_changed(&self, _conversations: Vec<Conversation>) {}
    async fn on_conversations_deleted(&self, _ids: Vec<String>) {}
    async fn on_total_unread_changed(&self, _total: u32) {}
    async fn on_sync_failed(&self, _reason: String) {}
}
