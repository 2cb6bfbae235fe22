//! 会话仓库
//!
//! 维护当前用户的会话列表：同步、创建（同一组参与者复用已有会话）、
//! 收到新消息时更新预览与未读数、标记已读和删除。

use crate::hub::conversation::api::ConversationRemote;
use crate::hub::conversation::dao::{ConversationDao, TABLE_NAME};
use crate::hub::conversation::listener::{ConversationListener, EmptyConversationListener};
use crate::hub::conversation::models::{normalize_participants, Conversation};
use crate::hub::db::SyncStateDao;
use crate::hub::error::ValidationError;
use crate::hub::message::Message;
use crate::hub::reconcile::{diff_by_id, DocumentChange};
use crate::hub::registration::{spawn_polling, ListenerRegistration};
use crate::hub::serialization::generate_client_id;
use crate::hub::types::now_millis;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

const TITLE_MAX_LEN: usize = 100;

/// 会话仓库
pub struct ConversationRepository {
    remote: Arc<dyn ConversationRemote>,
    dao: ConversationDao,
    sync_state: SyncStateDao,
    listener: Arc<dyn ConversationListener>,
    view: watch::Sender<Vec<Conversation>>,
}

impl ConversationRepository {
    pub fn new(
        remote: Arc<dyn ConversationRemote>,
        dao: ConversationDao,
        sync_state: SyncStateDao,
    ) -> Self {
        Self::with_listener(remote, dao, sync_state, Arc::new(EmptyConversationListener))
    }

    pub fn with_listener(
        remote: Arc<dyn ConversationRemote>,
        dao: ConversationDao,
        sync_state: SyncStateDao,
        listener: Arc<dyn ConversationListener>,
    ) -> Self {
        let (view, _) = watch::channel(Vec::new());
        Self {
            remote,
            dao,
            sync_state,
            listener,
            view,
        }
    }

    /// 订阅会话列表（最近活跃的在前）
    pub fn subscribe(&self) -> watch::Receiver<Vec<Conversation>> {
        self.view.subscribe()
    }

    pub async fn list(&self) -> Result<Vec<Conversation>> {
        self.dao.get_all().await
    }

    pub async fn get(&self, id: &str) -> Result<Option<Conversation>> {
        self.dao.get_by_id(id).await
    }

    pub async fn total_unread_count(&self) -> Result<u32> {
        self.dao.total_unread().await
    }

    async fn publish_view(&self) -> Result<()> {
        let list = self.dao.get_all().await?;
        self.view.send_replace(list);
        let total = self.dao.total_unread().await?;
        self.listener.on_total_unread_changed(total).await;
        Ok(())
    }

    /// 同步用户参与的会话
    pub async fn sync(&self, user_id: &str) -> Result<()> {
        info!("[ConvRepo] 🔄 开始同步会话，userID: {}", user_id);
        let remote = match self.remote.fetch_for_user(user_id).await {
            Ok(list) => list,
            Err(e) => {
                error!("[ConvRepo] 拉取会话失败: {:#}", e);
                self.listener.on_sync_failed(format!("{:#}", e)).await;
                return Err(e);
            }
        };
        let remote: Vec<Conversation> = remote
            .into_iter()
            .filter(|c| {
                let mine = c.has_participant(user_id);
                if !mine {
                    warn!("[ConvRepo] 服务器返回了用户 {} 未参与的会话: {}", user_id, c.id);
                }
                mine
            })
            .collect();

        let local = self.dao.get_all().await?;
        let diff = diff_by_id(&local, remote, |l, r| l == r);
        for conversation in diff.upserts() {
            self.dao.upsert(conversation).await?;
        }
        for id in diff.delete.iter() {
            self.dao.delete(id).await?;
        }
        self.sync_state
            .mark_synced(TABLE_NAME, user_id, now_millis())
            .await?;

        let changed: Vec<Conversation> = diff.upserts().cloned().collect();
        if !changed.is_empty() {
            self.listener.on_conversations_changed(changed).await;
        }
        if !diff.delete.is_empty() {
            self.listener
                .on_conversations_deleted(diff.delete.clone())
                .await;
        }
        self.publish_view().await?;
        info!(
            "[ConvRepo] ✅ 会话同步完成 - 新增: {}, 更新: {}, 删除: {}",
            diff.insert.len(),
            diff.update.len(),
            diff.delete.len()
        );
        Ok(())
    }

    /// 应用实时推送的会话变更
    pub async fn apply_changes(&self, changes: Vec<DocumentChange<Conversation>>) -> Result<()> {
        let mut changed = Vec::new();
        let mut deleted = Vec::new();
        for change in changes {
            match change {
                DocumentChange::Added(c) | DocumentChange::Modified(c) => {
                    self.dao.upsert(&c).await?;
                    changed.push(c);
                }
                DocumentChange::Removed(id) => {
                    if self.dao.delete(&id).await? {
                        deleted.push(id);
                    }
                }
            }
        }
        if !changed.is_empty() {
            self.listener.on_conversations_changed(changed).await;
        }
        if !deleted.is_empty() {
            self.listener.on_conversations_deleted(deleted).await;
        }
        self.publish_view().await
    }

    /// 创建会话；已存在同一组参与者的会话时直接返回该会话
    pub async fn create_conversation(
        &self,
        creator_id: &str,
        participant_ids: &[String],
        title: &str,
    ) -> Result<Conversation> {
        let mut all = participant_ids.to_vec();
        all.push(creator_id.to_string());
        let participants = normalize_participants(&all);
        if participants.len() < 2 {
            return Err(ValidationError::Invalid("会话至少需要两名参与者".to_string()).into());
        }
        let title = title.trim().to_string();
        if title.chars().count() > TITLE_MAX_LEN {
            return Err(ValidationError::TooLong {
                field: "会话标题",
                max: TITLE_MAX_LEN,
            }
            .into());
        }

        if let Some(existing) = self
            .dao
            .get_all()
            .await?
            .into_iter()
            .find(|c| c.participant_key() == participants)
        {
            debug!("[ConvRepo] 复用已有会话: {}", existing.id);
            return Ok(existing);
        }

        let now = now_millis();
        let conversation = Conversation {
            id: generate_client_id("conv"),
            participant_ids: participants,
            title,
            last_message: String::new(),
            last_message_at: 0,
            unread_count: 0,
            created_at: now,
            updated_at: now,
        };
        let saved = self.remote.create(&conversation).await?;
        self.dao.upsert(&saved).await?;
        self.listener
            .on_conversations_changed(vec![saved.clone()])
            .await;
        self.publish_view().await?;
        info!("[ConvRepo] ✅ 会话已创建: {}", saved.id);
        Ok(saved)
    }

    /// 收到新消息：更新预览；别人发的消息增加未读数。返回会话是否被更新
    pub async fn on_new_message(&self, message: &Message, me: &str) -> Result<bool> {
        self.record_message(message, message.sender_id != me).await
    }

    /// 记录一条消息。预览只跟随更新的消息，未读数与消息先后无关。
    /// 正在查看的会话传入 `count_unread = false`
    pub async fn record_message(&self, message: &Message, count_unread: bool) -> Result<bool> {
        let conversation_id = &message.conversation_id;
        let preview_updated = self
            .dao
            .update_last_message(conversation_id, &message.preview(), message.sent_at)
            .await?;
        let unread_updated = count_unread && self.dao.increment_unread(conversation_id).await?;

        if !preview_updated && !unread_updated {
            if self.dao.get_by_id(conversation_id).await?.is_none() {
                warn!(
                    "[ConvRepo] 收到未知会话 {} 的消息 {}，忽略",
                    conversation_id, message.id
                );
            } else {
                debug!("[ConvRepo] 消息 {} 早于会话最新消息，不更新预览", message.id);
            }
            return Ok(false);
        }
        if let Some(conversation) = self.dao.get_by_id(conversation_id).await? {
            self.listener
                .on_conversations_changed(vec![conversation])
                .await;
        }
        self.publish_view().await?;
        Ok(true)
    }

    /// 标记会话已读：先清本地未读数，再通知服务器
    pub async fn mark_as_read(&self, conversation_id: &str, user_id: &str) -> Result<()> {
        let Some(conversation) = self.dao.get_by_id(conversation_id).await? else {
            warn!("[ConvRepo] 标记已读的会话不存在: {}", conversation_id);
            return Ok(());
        };
        if conversation.unread_count == 0 {
            return Ok(());
        }
        self.dao.reset_unread(conversation_id).await?;
        self.listener
            .on_conversations_changed(vec![Conversation {
                unread_count: 0,
                ..conversation
            }])
            .await;
        self.publish_view().await?;
        self.remote.mark_read(conversation_id, user_id).await
    }

    /// 删除会话：先删本地，再删服务器
    pub async fn delete(&self, conversation_id: &str) -> Result<()> {
        if self.dao.delete(conversation_id).await? {
            self.listener
                .on_conversations_deleted(vec![conversation_id.to_string()])
                .await;
            self.publish_view().await?;
        }
        self.remote.delete(conversation_id).await?;
        info!("[ConvRepo] 🗑️ 会话已删除: {}", conversation_id);
        Ok(())
    }

    pub fn start_polling(self: &Arc<Self>, user_id: &str, period: Duration) -> ListenerRegistration {
        let user_id = user_id.to_string();
        spawn_polling("conversations", self.clone(), period, move |repo: Arc<Self>| {
            let user_id = user_id.clone();
            async move { repo.sync(&user_id).await }
        })
    }

    pub async fn clear(&self) -> Result<()> {
        self.dao.clear().await?;
        self.view.send_replace(Vec::new());
        Ok(())
    }
}
