//! 本地通知分发
//!
//! 实时收到新消息或新公告时决定是否弹出本地通知：自己发的不提示，
//! 正在查看的会话不提示。具体展示交给平台实现的 [`NotificationPresenter`]。

use crate::hub::announcement::Announcement;
use crate::hub::message::Message;
use crate::hub::user::UserRepository;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// 待展示的本地通知
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalNotification {
    pub id: String,
    pub title: String,
    pub body: String,
    /// 通知分组（会话 id 或 "announcements"）
    pub thread_id: String,
}

/// 平台本地通知接口
#[async_trait]
pub trait NotificationPresenter: Send + Sync {
    async fn present(&self, notification: LocalNotification);

    /// 更新应用角标（未读总数）
    async fn set_badge(&self, _count: u32) {}
}

/// 只记录日志的实现（CLI 使用）
pub struct LogPresenter;

#[async_trait]
impl NotificationPresenter for LogPresenter {
    async fn present(&self, notification: LocalNotification) {
        tracing::info!(
            "[Notify] 🔔 {} - {}",
            notification.title,
            notification.body
        );
    }
}

/// 本地通知分发器
pub struct NotificationDispatcher {
    presenter: Arc<dyn NotificationPresenter>,
    users: Option<Arc<UserRepository>>,
    current_user: RwLock<Option<String>>,
    active_conversation: RwLock<Option<String>>,
}

impl NotificationDispatcher {
    pub fn new(presenter: Arc<dyn NotificationPresenter>) -> Self {
        Self {
            presenter,
            users: None,
            current_user: RwLock::new(None),
            active_conversation: RwLock::new(None),
        }
    }

    /// 使用用户仓库把发送者 id 解析为显示名
    pub fn with_users(mut self, users: Arc<UserRepository>) -> Self {
        self.users = Some(users);
        self
    }

    pub async fn set_current_user(&self, user_id: Option<String>) {
        *self.current_user.write().await = user_id;
    }

    /// 当前正在查看的会话（页面打开时设置，离开时清空）
    pub async fn set_active_conversation(&self, conversation_id: Option<String>) {
        *self.active_conversation.write().await = conversation_id;
    }

    /// 离开会话页面；只有仍是当前会话时才清空
    pub async fn leave_conversation(&self, conversation_id: &str) {
        let mut active = self.active_conversation.write().await;
        if active.as_deref() == Some(conversation_id) {
            *active = None;
        }
    }

    pub async fn active_conversation(&self) -> Option<String> {
        self.active_conversation.read().await.clone()
    }

    async fn display_name(&self, user_id: &str) -> String {
        if let Some(users) = &self.users {
            match users.get_user(user_id).await {
                Ok(Some(user)) => return user.display_name(),
                Ok(None) => {}
                Err(e) => warn!("[Notify] 获取用户 {} 失败: {:#}", user_id, e),
            }
        }
        user_id.to_string()
    }

    /// 处理实时收到的新消息，返回实际展示的通知数
    pub async fn handle_new_messages(&self, messages: &[Message]) -> usize {
        let me = self.current_user.read().await.clone();
        let active = self.active_conversation.read().await.clone();
        let mut shown = 0;
        for message in messages {
            if me.as_deref() == Some(message.sender_id.as_str()) {
                continue;
            }
            if active.as_deref() == Some(message.conversation_id.as_str()) {
                debug!("[Notify] 会话 {} 正在查看，不提示", message.conversation_id);
                continue;
            }
            let title = self.display_name(&message.sender_id).await;
            self.presenter
                .present(LocalNotification {
                    id: message.id.clone(),
                    title,
                    body: message.preview(),
                    thread_id: message.conversation_id.clone(),
                })
                .await;
            shown += 1;
        }
        shown
    }

    /// 处理新发布的公告（作者本人不提示），返回实际展示的通知数
    pub async fn handle_new_announcements(&self, announcements: &[Announcement]) -> usize {
        let me = self.current_user.read().await.clone();
        let mut shown = 0;
        for announcement in announcements {
            if me.as_deref() == Some(announcement.author_id.as_str()) {
                continue;
            }
            self.presenter
                .present(LocalNotification {
                    id: announcement.id.clone(),
                    title: announcement.title.clone(),
                    body: announcement.content.chars().take(120).collect(),
                    thread_id: "announcements".to_string(),
                })
                .await;
            shown += 1;
        }
        shown
    }

    pub async fn update_badge(&self, total_unread: u32) {
        self.presenter.set_badge(total_unread).await;
    }
}
