//! 公告仓库
//!
//! 合并本地缓存与服务器数据，对外提供统一的只读视图（watch）和发布 / 编辑 / 删除操作。
//! 发布采用乐观写入：本地草稿 → 发布中 → 已发布（或失败）。

use crate::hub::announcement::api::AnnouncementRemote;
use crate::hub::announcement::dao::{AnnouncementDao, TABLE_NAME};
use crate::hub::announcement::listener::{AnnouncementListener, EmptyAnnouncementListener};
use crate::hub::announcement::models::Announcement;
use crate::hub::db::SyncStateDao;
use crate::hub::error::require_text;
use crate::hub::reconcile::{diff_by_id, DocumentChange};
use crate::hub::registration::{spawn_polling, ListenerRegistration};
use crate::hub::serialization::generate_client_id;
use crate::hub::types::{now_millis, SyncState};
use anyhow::{anyhow, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

const TITLE_MAX_LEN: usize = 120;
const CONTENT_MAX_LEN: usize = 5000;

/// 公告仓库
pub struct AnnouncementRepository {
    remote: Arc<dyn AnnouncementRemote>,
    dao: AnnouncementDao,
    sync_state: SyncStateDao,
    listener: Arc<dyn AnnouncementListener>,
    view: watch::Sender<Vec<Announcement>>,
}

impl AnnouncementRepository {
    /// 创建公告仓库（使用默认空监听器）
    pub fn new(remote: Arc<dyn AnnouncementRemote>, dao: AnnouncementDao, sync_state: SyncStateDao) -> Self {
        Self::with_listener(remote, dao, sync_state, Arc::new(EmptyAnnouncementListener))
    }

    pub fn with_listener(
        remote: Arc<dyn AnnouncementRemote>,
        dao: AnnouncementDao,
        sync_state: SyncStateDao,
        listener: Arc<dyn AnnouncementListener>,
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

    /// 订阅合并后的公告列表（最新的在前）
    pub fn subscribe(&self) -> watch::Receiver<Vec<Announcement>> {
        self.view.subscribe()
    }

    pub async fn list(&self) -> Result<Vec<Announcement>> {
        self.dao.get_all().await
    }

    pub async fn get(&self, id: &str) -> Result<Option<Announcement>> {
        self.dao.get_by_id(id).await
    }

    /// 从本地重新加载并推送视图
    pub async fn refresh_view(&self) -> Result<()> {
        let list = self.dao.get_all().await?;
        self.view.send_replace(list);
        Ok(())
    }

    /// 全量拉取服务器公告并与本地对比
    ///
    /// 本地草稿和发布失败的公告不在服务器上，不会被删除。
    pub async fn sync(&self) -> Result<()> {
        info!("[AnnRepo] 🔄 开始同步公告...");
        let remote = match self.remote.fetch_all().await {
            Ok(list) => list,
            Err(e) => {
                error!("[AnnRepo] 拉取公告失败: {:#}", e);
                self.listener.on_sync_failed(format!("{:#}", e)).await;
                return Err(e);
            }
        };

        let remote: Vec<Announcement> = remote
            .into_iter()
            .map(|mut a| {
                a.state = SyncState::Published;
                a
            })
            .collect();
        let (pending, synced): (Vec<Announcement>, Vec<Announcement>) = self
            .dao
            .get_all()
            .await?
            .into_iter()
            .partition(|a| a.state.is_local_only());
        debug!(
            "[AnnRepo] 服务器公告数: {}, 本地已发布: {}, 本地待发布: {}",
            remote.len(),
            synced.len(),
            pending.len()
        );

        let diff = diff_by_id(&synced, remote, |l, r| l == r);
        for announcement in diff.upserts() {
            self.dao.upsert(announcement).await?;
        }
        for id in diff.delete.iter() {
            warn!("[AnnRepo]   删除公告: {}", id);
            self.dao.delete(id).await?;
        }
        self.sync_state.mark_synced(TABLE_NAME, "", now_millis()).await?;

        let changed: Vec<Announcement> = diff.upserts().cloned().collect();
        if !changed.is_empty() {
            self.listener.on_announcements_changed(changed).await;
        }
        if !diff.delete.is_empty() {
            self.listener.on_announcements_deleted(diff.delete.clone()).await;
        }
        self.refresh_view().await?;

        info!(
            "[AnnRepo] ✅ 公告同步完成 - 新增: {}, 更新: {}, 删除: {}",
            diff.insert.len(),
            diff.update.len(),
            diff.delete.len()
        );
        Ok(())
    }

    /// 应用实时推送的增量变更，返回本次新增的公告
    pub async fn apply_changes(
        &self,
        changes: Vec<DocumentChange<Announcement>>,
    ) -> Result<Vec<Announcement>> {
        let mut added = Vec::new();
        let mut changed = Vec::new();
        let mut deleted = Vec::new();

        for change in changes {
            match change {
                DocumentChange::Added(mut a) | DocumentChange::Modified(mut a) => {
                    a.state = SyncState::Published;
                    let is_new = self.dao.get_by_id(&a.id).await?.is_none();
                    self.dao.upsert(&a).await?;
                    if is_new {
                        added.push(a.clone());
                    }
                    changed.push(a);
                }
                DocumentChange::Removed(id) => {
                    if self.dao.delete(&id).await? {
                        deleted.push(id);
                    }
                }
            }
        }

        debug!(
            "[AnnRepo] 实时变更 - 变更: {}, 删除: {}",
            changed.len(),
            deleted.len()
        );
        if !changed.is_empty() {
            self.listener.on_announcements_changed(changed).await;
        }
        if !deleted.is_empty() {
            self.listener.on_announcements_deleted(deleted).await;
        }
        self.refresh_view().await?;
        Ok(added)
    }

    /// 发布新公告：先落本地草稿，再写服务器
    pub async fn create(
        &self,
        author_id: &str,
        title: &str,
        content: &str,
        image_url: Option<String>,
    ) -> Result<Announcement> {
        let title = require_text("标题", title, TITLE_MAX_LEN)?;
        let content = require_text("内容", content, CONTENT_MAX_LEN)?;
        let now = now_millis();
        let draft = Announcement {
            id: generate_client_id("ann"),
            author_id: author_id.to_string(),
            title,
            content,
            image_url: image_url.filter(|u| !u.trim().is_empty()),
            created_at: now,
            updated_at: now,
            state: SyncState::Draft,
        };
        self.dao.upsert(&draft).await?;
        info!("[AnnRepo] 📝 公告草稿已保存: {}", draft.id);
        self.publish(draft).await
    }

    /// 重新发布草稿或发布失败的公告
    pub async fn retry_publish(&self, id: &str) -> Result<Announcement> {
        let announcement = self
            .dao
            .get_by_id(id)
            .await?
            .ok_or_else(|| anyhow!("公告不存在: {}", id))?;
        if announcement.state == SyncState::Published {
            return Ok(announcement);
        }
        self.publish(announcement).await
    }

    async fn publish(&self, mut announcement: Announcement) -> Result<Announcement> {
        announcement.state = SyncState::Publishing;
        self.dao.upsert(&announcement).await?;
        self.refresh_view().await?;

        match self.remote.create(&announcement).await {
            Ok(mut saved) => {
                saved.state = SyncState::Published;
                if saved.id != announcement.id {
                    self.dao.delete(&announcement.id).await?;
                }
                self.dao.upsert(&saved).await?;
                self.listener
                    .on_announcements_changed(vec![saved.clone()])
                    .await;
                self.refresh_view().await?;
                info!("[AnnRepo] ✅ 公告已发布: {}", saved.id);
                Ok(saved)
            }
            Err(e) => {
                error!("[AnnRepo] ❌ 公告发布失败: {}, {:#}", announcement.id, e);
                announcement.state = SyncState::Error;
                self.dao.update_state(&announcement.id, SyncState::Error).await?;
                self.listener
                    .on_announcements_changed(vec![announcement])
                    .await;
                self.refresh_view().await?;
                Err(e)
            }
        }
    }

    /// 编辑公告：已发布的先写服务器再写本地；未发布的只改本地后重新发布
    pub async fn update(&self, announcement: &Announcement) -> Result<Announcement> {
        let mut edited = announcement.clone();
        edited.title = require_text("标题", &edited.title, TITLE_MAX_LEN)?;
        edited.content = require_text("内容", &edited.content, CONTENT_MAX_LEN)?;
        edited.updated_at = now_millis();

        let existing = self
            .dao
            .get_by_id(&edited.id)
            .await?
            .ok_or_else(|| anyhow!("公告不存在: {}", edited.id))?;
        if existing.state.is_local_only() {
            edited.state = existing.state;
            self.dao.upsert(&edited).await?;
            return self.publish(edited).await;
        }

        let mut saved = self.remote.update(&edited).await?;
        saved.state = SyncState::Published;
        self.dao.upsert(&saved).await?;
        self.listener
            .on_announcements_changed(vec![saved.clone()])
            .await;
        self.refresh_view().await?;
        info!("[AnnRepo] ✏️ 公告已更新: {}", saved.id);
        Ok(saved)
    }

    /// 删除公告：先删本地，再删服务器（两者之间没有事务）
    pub async fn delete(&self, id: &str) -> Result<()> {
        let existing = self.dao.get_by_id(id).await?;
        self.dao.delete(id).await?;
        self.listener
            .on_announcements_deleted(vec![id.to_string()])
            .await;
        self.refresh_view().await?;

        match existing {
            Some(a) if a.state.is_local_only() => {
                debug!("[AnnRepo] 公告 {} 未发布，无需删除服务器数据", id);
                Ok(())
            }
            _ => {
                self.remote.delete(id).await?;
                info!("[AnnRepo] 🗑️ 公告已删除: {}", id);
                Ok(())
            }
        }
    }

    /// 定时轮询同步
    pub fn start_polling(self: &Arc<Self>, period: Duration) -> ListenerRegistration {
        spawn_polling("announcements", self.clone(), period, |repo: Arc<Self>| async move {
            repo.sync().await
        })
    }

    /// 清空本地数据（退出登录时调用）
    pub async fn clear(&self) -> Result<()> {
        self.dao.clear().await?;
        self.view.send_replace(Vec::new());
        Ok(())
    }
}
