//! 消息仓库
//!
//! 发送采用乐观写入：本地先以 sending 落库并推送视图，服务器确认后改为 sent，
//! 失败则标记为 failed 等待重发。同步时保留尚未确认的本地消息。

use crate::hub::db::SyncStateDao;
use crate::hub::error::require_text;
use crate::hub::message::api::MessageRemote;
use crate::hub::message::dao::{MessageDao, TABLE_NAME};
use crate::hub::message::listener::{EmptyMessageListener, MessageListener};
use crate::hub::message::models::Message;
use crate::hub::reconcile::{diff_by_id, DocumentChange};
use crate::hub::registration::{spawn_polling, ListenerRegistration};
use crate::hub::serialization::generate_client_id;
use crate::hub::types::{now_millis, SendState};
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

const CONTENT_MAX_LEN: usize = 2000;

/// sending 状态超过该时长（毫秒）视为发送中断
const SENDING_STALE_MS: i64 = 60_000;

/// 消息仓库
pub struct MessageRepository {
    remote: Arc<dyn MessageRemote>,
    dao: MessageDao,
    sync_state: SyncStateDao,
    listener: Arc<dyn MessageListener>,
    /// 每个会话一个视图
    views: Mutex<HashMap<String, watch::Sender<Vec<Message>>>>,
}

impl MessageRepository {
    pub fn new(remote: Arc<dyn MessageRemote>, dao: MessageDao, sync_state: SyncStateDao) -> Self {
        Self::with_listener(remote, dao, sync_state, Arc::new(EmptyMessageListener))
    }

    pub fn with_listener(
        remote: Arc<dyn MessageRemote>,
        dao: MessageDao,
        sync_state: SyncStateDao,
        listener: Arc<dyn MessageListener>,
    ) -> Self {
        Self {
            remote,
            dao,
            sync_state,
            listener,
            views: Mutex::new(HashMap::new()),
        }
    }

    /// 订阅某个会话的消息列表（按发送时间升序），订阅时立即加载本地数据
    pub async fn subscribe(&self, conversation_id: &str) -> Result<watch::Receiver<Vec<Message>>> {
        let current = self.dao.get_messages(conversation_id).await?;
        let mut views = self.views.lock().await;
        let sender = views
            .entry(conversation_id.to_string())
            .or_insert_with(|| watch::channel(Vec::new()).0);
        sender.send_replace(current);
        Ok(sender.subscribe())
    }

    /// 页面离开后释放会话视图
    pub async fn release_view(&self, conversation_id: &str) {
        self.views.lock().await.remove(conversation_id);
    }

    pub async fn list(&self, conversation_id: &str) -> Result<Vec<Message>> {
        self.dao.get_messages(conversation_id).await
    }

    async fn refresh_view(&self, conversation_id: &str) -> Result<()> {
        let views = self.views.lock().await;
        if let Some(sender) = views.get(conversation_id) {
            let list = self.dao.get_messages(conversation_id).await?;
            sender.send_replace(list);
        }
        Ok(())
    }

    /// 同步某个会话的消息；sending / failed 的本地消息不会被删除
    pub async fn sync(&self, conversation_id: &str) -> Result<()> {
        debug!("[MsgRepo] 🔄 同步会话消息: {}", conversation_id);
        let fetched = match self.remote.fetch_messages(conversation_id).await {
            Ok(list) => list,
            Err(e) => {
                error!("[MsgRepo] 拉取会话 {} 消息失败: {:#}", conversation_id, e);
                self.listener
                    .on_sync_failed(conversation_id.to_string(), format!("{:#}", e))
                    .await;
                return Err(e);
            }
        };
        let remote: Vec<Message> = fetched
            .into_iter()
            .filter(|m| m.conversation_id == conversation_id)
            .map(|mut m| {
                m.state = SendState::Sent;
                m
            })
            .collect();

        let synced: Vec<Message> = self
            .dao
            .get_messages(conversation_id)
            .await?
            .into_iter()
            .filter(|m| m.state == SendState::Sent)
            .collect();

        let diff = diff_by_id(&synced, remote, |l, r| l == r);
        for message in diff.upserts() {
            self.dao.upsert(message).await?;
        }
        for id in diff.delete.iter() {
            self.dao.delete(conversation_id, id).await?;
        }
        self.sync_state
            .mark_synced(TABLE_NAME, conversation_id, now_millis())
            .await?;

        let changed: Vec<Message> = diff.upserts().cloned().collect();
        if !changed.is_empty() {
            self.listener
                .on_messages_changed(conversation_id.to_string(), changed)
                .await;
        }
        if !diff.delete.is_empty() {
            self.listener
                .on_messages_deleted(conversation_id.to_string(), diff.delete.clone())
                .await;
        }
        self.refresh_view(conversation_id).await?;
        info!(
            "[MsgRepo] ✅ 会话 {} 消息同步完成 - 新增: {}, 更新: {}, 删除: {}",
            conversation_id,
            diff.insert.len(),
            diff.update.len(),
            diff.delete.len()
        );
        Ok(())
    }

    /// 应用实时推送的消息变更，返回新收到的消息
    pub async fn apply_changes(
        &self,
        conversation_id: &str,
        changes: Vec<DocumentChange<Message>>,
    ) -> Result<Vec<Message>> {
        let mut changed = Vec::new();
        let mut fresh = Vec::new();
        let mut deleted = Vec::new();

        for change in changes {
            match change {
                DocumentChange::Added(mut m) | DocumentChange::Modified(mut m) => {
                    if m.conversation_id != conversation_id {
                        warn!(
                            "[MsgRepo] 忽略不属于会话 {} 的消息: {}",
                            conversation_id, m.id
                        );
                        continue;
                    }
                    m.state = SendState::Sent;
                    let is_new = self.dao.get_message(conversation_id, &m.id).await?.is_none();
                    self.dao.upsert(&m).await?;
                    if is_new {
                        fresh.push(m.clone());
                    }
                    changed.push(m);
                }
                DocumentChange::Removed(id) => {
                    if self.dao.delete(conversation_id, &id).await? {
                        deleted.push(id);
                    }
                }
            }
        }

        if !changed.is_empty() {
            self.listener
                .on_messages_changed(conversation_id.to_string(), changed)
                .await;
        }
        if !deleted.is_empty() {
            self.listener
                .on_messages_deleted(conversation_id.to_string(), deleted)
                .await;
        }
        if !fresh.is_empty() {
            self.listener.on_new_messages(fresh.clone()).await;
        }
        self.refresh_view(conversation_id).await?;
        Ok(fresh)
    }

    /// 发送文本消息
    pub async fn send_text(
        &self,
        conversation_id: &str,
        sender_id: &str,
        content: &str,
    ) -> Result<Message> {
        let content = require_text("消息内容", content, CONTENT_MAX_LEN)?;
        let message = Message {
            id: generate_client_id("msg"),
            conversation_id: conversation_id.to_string(),
            sender_id: sender_id.to_string(),
            content,
            sent_at: now_millis(),
            state: SendState::Sending,
        };
        self.deliver(message).await
    }

    /// 重发失败或发送中断的消息
    pub async fn resend(&self, conversation_id: &str, id: &str) -> Result<Message> {
        let message = self
            .dao
            .get_message(conversation_id, id)
            .await?
            .ok_or_else(|| anyhow!("消息不存在: {}", id))?;
        match message.state {
            SendState::Sent => Ok(message),
            SendState::Sending if now_millis() - message.sent_at < SENDING_STALE_MS => {
                Err(anyhow!("消息正在发送中: {}", id))
            }
            // 超时仍是 sending 说明上次发送被中断（例如进程退出），允许重发
            SendState::Sending | SendState::Failed => {
                info!("[MsgRepo] 🔁 重发消息: {}", id);
                self.deliver(Message {
                    state: SendState::Sending,
                    ..message
                })
                .await
            }
        }
    }

    async fn deliver(&self, message: Message) -> Result<Message> {
        let conversation_id = message.conversation_id.clone();
        self.dao.upsert(&message).await?;
        self.listener
            .on_messages_changed(conversation_id.clone(), vec![message.clone()])
            .await;
        self.refresh_view(&conversation_id).await?;

        match self.remote.send(&message).await {
            Ok(mut saved) => {
                saved.state = SendState::Sent;
                if saved.id != message.id {
                    self.dao.delete(&conversation_id, &message.id).await?;
                }
                self.dao.upsert(&saved).await?;
                self.listener
                    .on_messages_changed(conversation_id.clone(), vec![saved.clone()])
                    .await;
                self.refresh_view(&conversation_id).await?;
                debug!("[MsgRepo] ✅ 消息已发送: {}", saved.id);
                Ok(saved)
            }
            Err(e) => {
                error!("[MsgRepo] ❌ 消息发送失败: {}, {:#}", message.id, e);
                self.dao.update_state(&message.id, SendState::Failed).await?;
                self.listener
                    .on_messages_changed(
                        conversation_id.clone(),
                        vec![Message {
                            state: SendState::Failed,
                            ..message
                        }],
                    )
                    .await;
                self.refresh_view(&conversation_id).await?;
                Err(e)
            }
        }
    }

    /// 删除消息：先删本地，已发送的再删服务器
    pub async fn delete(&self, conversation_id: &str, id: &str) -> Result<()> {
        let existing = self.dao.get_message(conversation_id, id).await?;
        self.dao.delete(conversation_id, id).await?;
        self.listener
            .on_messages_deleted(conversation_id.to_string(), vec![id.to_string()])
            .await;
        self.refresh_view(conversation_id).await?;
        if matches!(existing, Some(ref m) if m.state == SendState::Sent) {
            self.remote.delete(conversation_id, id).await?;
        }
        Ok(())
    }

    /// 定时同步某个会话的消息（会话页面打开期间使用）
    pub fn start_polling(
        self: &Arc<Self>,
        conversation_id: &str,
        period: Duration,
    ) -> ListenerRegistration {
        let conversation_id = conversation_id.to_string();
        let name = format!("messages:{}", conversation_id);
        spawn_polling(&name, self.clone(), period, move |repo: Arc<Self>| {
            let conversation_id = conversation_id.clone();
            async move { repo.sync(&conversation_id).await }
        })
    }

    /// 会话被删除后清理其本地消息
    pub async fn purge_conversation(&self, conversation_id: &str) -> Result<()> {
        let removed = self.dao.delete_conversation(conversation_id).await?;
        debug!("[MsgRepo] 清理会话 {} 的 {} 条消息", conversation_id, removed);
        self.refresh_view(conversation_id).await
    }

    pub async fn clear(&self) -> Result<()> {
        self.dao.clear().await?;
        self.views.lock().await.clear();
        Ok(())
    }
}
