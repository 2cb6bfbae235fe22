//! 登录用户的工作区：各仓库的组装、全量同步与实时快照路由

use crate::hub::announcement::{
    Announcement, AnnouncementApi, AnnouncementDao, AnnouncementListener, AnnouncementRemote,
    AnnouncementRepository, EmptyAnnouncementListener,
};
use crate::hub::conversation::{
    Conversation, ConversationApi, ConversationDao, ConversationListener, ConversationRemote,
    ConversationRepository, EmptyConversationListener,
};
use crate::hub::db::SyncStateDao;
use crate::hub::http::ApiClient;
use crate::hub::message::{
    EmptyMessageListener, Message, MessageApi, MessageDao, MessageListener, MessageRemote,
    MessageRepository,
};
use crate::hub::mission::{
    EmptyMissionListener, Mission, MissionApi, MissionDao, MissionListener, MissionRemote,
    MissionRepository,
};
use crate::hub::notification::{
    LogPresenter, NotificationDispatcher, NotificationPresenter, PushTokenApi, PushTokenDao,
    PushTokenRemote, PushTokenService,
};
use crate::hub::realtime::{Collection, Snapshot, SnapshotSink};
use crate::hub::reconcile::{decode_changes, DocumentChange};
use crate::hub::registration::ListenerRegistration;
use crate::hub::user::{UserApi, UserDao, UserRemote, UserRepository};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use sqlx::{Pool, Sqlite};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// 工作区使用的远端接口
pub struct Remotes {
    pub users: Arc<dyn UserRemote>,
    pub announcements: Arc<dyn AnnouncementRemote>,
    pub missions: Arc<dyn MissionRemote>,
    pub conversations: Arc<dyn ConversationRemote>,
    pub messages: Arc<dyn MessageRemote>,
    pub push: Arc<dyn PushTokenRemote>,
}

impl Remotes {
    /// 全部使用同一个（已带认证头的）HTTP 客户端
    pub fn http(client: ApiClient) -> Self {
        Self {
            users: Arc::new(UserApi::new(client.clone())),
            announcements: Arc::new(AnnouncementApi::new(client.clone())),
            missions: Arc::new(MissionApi::new(client.clone())),
            conversations: Arc::new(ConversationApi::new(client.clone())),
            messages: Arc::new(MessageApi::new(client.clone())),
            push: Arc::new(PushTokenApi::new(client)),
        }
    }
}

/// 调用方注册的监听器与通知展示
#[derive(Clone)]
pub struct Listeners {
    pub announcements: Arc<dyn AnnouncementListener>,
    pub missions: Arc<dyn MissionListener>,
    pub conversations: Arc<dyn ConversationListener>,
    pub messages: Arc<dyn MessageListener>,
    pub presenter: Arc<dyn NotificationPresenter>,
}

impl Default for Listeners {
    fn default() -> Self {
        Self {
            announcements: Arc::new(EmptyAnnouncementListener),
            missions: Arc::new(EmptyMissionListener),
            conversations: Arc::new(EmptyConversationListener),
            messages: Arc::new(EmptyMessageListener),
            presenter: Arc::new(LogPresenter),
        }
    }
}

/// 登录用户的仓库集合
pub struct Workspace {
    pub user_id: String,
    pub users: Arc<UserRepository>,
    pub announcements: Arc<AnnouncementRepository>,
    pub missions: Arc<MissionRepository>,
    pub conversations: Arc<ConversationRepository>,
    pub messages: Arc<MessageRepository>,
    pub push: PushTokenService,
    pub dispatcher: Arc<NotificationDispatcher>,
    sync_state: SyncStateDao,
}

impl Workspace {
    pub fn new(user_id: &str, db: Pool<Sqlite>, remotes: Remotes, listeners: Listeners) -> Self {
        let sync_state = SyncStateDao::new(db.clone());
        let users = Arc::new(UserRepository::new(remotes.users, UserDao::new(db.clone())));
        let dispatcher = Arc::new(
            NotificationDispatcher::new(listeners.presenter.clone()).with_users(users.clone()),
        );
        Self {
            user_id: user_id.to_string(),
            announcements: Arc::new(AnnouncementRepository::with_listener(
                remotes.announcements,
                AnnouncementDao::new(db.clone()),
                sync_state.clone(),
                listeners.announcements,
            )),
            missions: Arc::new(MissionRepository::with_listener(
                remotes.missions,
                MissionDao::new(db.clone()),
                sync_state.clone(),
                listeners.missions,
            )),
            conversations: Arc::new(ConversationRepository::with_listener(
                remotes.conversations,
                ConversationDao::new(db.clone()),
                sync_state.clone(),
                listeners.conversations,
            )),
            messages: Arc::new(MessageRepository::with_listener(
                remotes.messages,
                MessageDao::new(db.clone()),
                sync_state.clone(),
                listeners.messages,
            )),
            push: PushTokenService::new(remotes.push, PushTokenDao::new(db)),
            users,
            dispatcher,
            sync_state,
        }
    }

    /// 同步用户资料、公告、任务与会话；各项互不影响，返回第一个错误
    pub async fn sync_all(&self) -> Result<()> {
        info!("[Workspace] 🔄 开始全量同步，userID: {}", self.user_id);
        let (profile, announcements, missions, conversations) = tokio::join!(
            self.users.refresh_user(&self.user_id),
            self.announcements.sync(),
            self.missions.sync(),
            self.conversations.sync(&self.user_id),
        );

        let results = [
            ("用户资料", profile.map(|_| ())),
            ("公告", announcements),
            ("任务", missions),
            ("会话", conversations),
        ];
        let mut first_error = None;
        for (name, result) in results {
            if let Err(e) = result {
                error!("[Workspace] ❌ {}同步失败: {:#}", name, e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => {
                let unread = self.conversations.total_unread_count().await?;
                self.dispatcher.update_badge(unread).await;
                info!("[Workspace] ✅ 全量同步完成");
                Ok(())
            }
        }
    }

    /// 启动公告、任务、会话的定时轮询
    pub fn start_polling(&self, period: Duration) -> Vec<ListenerRegistration> {
        vec![
            self.announcements.start_polling(period),
            self.missions.start_polling(period),
            self.conversations.start_polling(&self.user_id, period),
        ]
    }

    /// 发送消息并更新会话预览
    pub async fn send_message(&self, conversation_id: &str, content: &str) -> Result<Message> {
        let message = self
            .messages
            .send_text(conversation_id, &self.user_id, content)
            .await?;
        self.conversations
            .on_new_message(&message, &self.user_id)
            .await?;
        Ok(message)
    }

    /// 删除会话及其本地消息
    pub async fn delete_conversation(&self, conversation_id: &str) -> Result<()> {
        self.messages.purge_conversation(conversation_id).await?;
        self.conversations.delete(conversation_id).await
    }

    /// 清理本地缓存（退出登录时调用）
    pub async fn clear_local(&self) -> Result<()> {
        self.announcements.clear().await?;
        self.missions.clear().await?;
        self.conversations.clear().await?;
        self.messages.clear().await?;
        self.users.clear_cache().await?;
        self.sync_state.clear().await?;
        self.dispatcher.set_current_user(None).await;
        Ok(())
    }
}

/// 把实时快照分发到对应仓库
pub struct SnapshotRouter {
    workspace: Arc<Workspace>,
}

impl SnapshotRouter {
    pub fn new(workspace: Arc<Workspace>) -> Self {
        Self { workspace }
    }

    pub async fn route(&self, snapshot: Snapshot) -> Result<()> {
        let ws = &self.workspace;
        match snapshot.collection {
            Collection::Announcements => {
                let (changes, rejected) = decode_changes::<Announcement>(snapshot.changes);
                log_rejected(snapshot.collection, &rejected);
                let added = ws.announcements.apply_changes(changes).await?;
                ws.dispatcher.handle_new_announcements(&added).await;
            }
            Collection::Missions => {
                let (changes, rejected) = decode_changes::<Mission>(snapshot.changes);
                log_rejected(snapshot.collection, &rejected);
                ws.missions.apply_changes(changes).await?;
            }
            Collection::Conversations => {
                let (changes, rejected) = decode_changes::<Conversation>(snapshot.changes);
                log_rejected(snapshot.collection, &rejected);
                let removed: Vec<String> = changes
                    .iter()
                    .filter(|c| matches!(c, DocumentChange::Removed(_)))
                    .map(|c| c.id().to_string())
                    .collect();
                ws.conversations.apply_changes(changes).await?;
                for id in removed.iter() {
                    ws.messages.purge_conversation(id).await?;
                }
                let unread = ws.conversations.total_unread_count().await?;
                ws.dispatcher.update_badge(unread).await;
            }
            Collection::Messages => {
                let conversation_id = snapshot
                    .parent_id
                    .ok_or_else(|| anyhow!("消息快照缺少 parentID"))?;
                let (changes, rejected) = decode_changes::<Message>(snapshot.changes);
                log_rejected(snapshot.collection, &rejected);
                let fresh = ws.messages.apply_changes(&conversation_id, changes).await?;
                // 正在查看的会话不计未读
                let viewing = ws.dispatcher.active_conversation().await.as_deref()
                    == Some(conversation_id.as_str());
                for message in fresh.iter() {
                    let count_unread = !viewing && message.sender_id != ws.user_id;
                    ws.conversations.record_message(message, count_unread).await?;
                }
                if !fresh.is_empty() {
                    ws.dispatcher.handle_new_messages(&fresh).await;
                    let unread = ws.conversations.total_unread_count().await?;
                    ws.dispatcher.update_badge(unread).await;
                }
            }
        }
        Ok(())
    }
}

fn log_rejected(collection: Collection, rejected: &[String]) {
    if !rejected.is_empty() {
        warn!("[Router] {} 中无法解析的变更: {:?}", collection, rejected);
    }
}

#[async_trait]
impl SnapshotSink for SnapshotRouter {
    async fn on_snapshot(&self, snapshot: Snapshot) {
        let collection = snapshot.collection;
        if let Err(e) = self.route(snapshot).await {
            error!("[Router] 处理 {} 快照失败: {:#}", collection, e);
        }
    }

    async fn on_connection_changed(&self, connected: bool, reason: String) {
        if connected {
            info!("[Router] 实时连接已建立: {}", reason);
        } else {
            warn!("[Router] 实时连接断开: {}", reason);
        }
    }
}
