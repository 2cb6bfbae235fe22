//! 任务仓库
//!
//! 与公告相同的发布流程（草稿 → 发布中 → 已发布 / 失败），另外负责报名与取消报名。

use crate::hub::db::SyncStateDao;
use crate::hub::error::{require_text, MissionError, ValidationError};
use crate::hub::mission::api::MissionRemote;
use crate::hub::mission::dao::{MissionDao, TABLE_NAME};
use crate::hub::mission::listener::{EmptyMissionListener, MissionListener};
use crate::hub::mission::models::{Mission, MissionDraft};
use crate::hub::reconcile::{diff_by_id, DocumentChange};
use crate::hub::registration::{spawn_polling, ListenerRegistration};
use crate::hub::serialization::generate_client_id;
use crate::hub::types::{now_millis, SyncState};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

const TITLE_MAX_LEN: usize = 120;
const DESCRIPTION_MAX_LEN: usize = 5000;
const LOCATION_MAX_LEN: usize = 200;

/// 任务仓库
pub struct MissionRepository {
    remote: Arc<dyn MissionRemote>,
    dao: MissionDao,
    sync_state: SyncStateDao,
    listener: Arc<dyn MissionListener>,
    view: watch::Sender<Vec<Mission>>,
}

fn validate_draft(draft: &MissionDraft) -> Result<MissionDraft, ValidationError> {
    let title = require_text("标题", &draft.title, TITLE_MAX_LEN)?;
    let description = draft.description.trim().to_string();
    if description.chars().count() > DESCRIPTION_MAX_LEN {
        return Err(ValidationError::TooLong {
            field: "描述",
            max: DESCRIPTION_MAX_LEN,
        });
    }
    let location = draft.location.trim().to_string();
    if location.chars().count() > LOCATION_MAX_LEN {
        return Err(ValidationError::TooLong {
            field: "地点",
            max: LOCATION_MAX_LEN,
        });
    }
    if let Some(ends_at) = draft.ends_at {
        if ends_at < draft.starts_at {
            return Err(ValidationError::Invalid("结束时间早于开始时间".to_string()));
        }
    }
    if draft.capacity == Some(0) {
        return Err(ValidationError::Invalid("人数上限必须大于 0".to_string()));
    }
    Ok(MissionDraft {
        title,
        description,
        location,
        ..draft.clone()
    })
}

impl MissionRepository {
    pub fn new(remote: Arc<dyn MissionRemote>, dao: MissionDao, sync_state: SyncStateDao) -> Self {
        Self::with_listener(remote, dao, sync_state, Arc::new(EmptyMissionListener))
    }

    pub fn with_listener(
        remote: Arc<dyn MissionRemote>,
        dao: MissionDao,
        sync_state: SyncStateDao,
        listener: Arc<dyn MissionListener>,
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

    /// 订阅任务列表（按开始时间升序）
    pub fn subscribe(&self) -> watch::Receiver<Vec<Mission>> {
        self.view.subscribe()
    }

    pub async fn list(&self) -> Result<Vec<Mission>> {
        self.dao.get_all().await
    }

    /// 尚未结束的任务
    pub async fn upcoming(&self, now: i64) -> Result<Vec<Mission>> {
        Ok(self
            .dao
            .get_all()
            .await?
            .into_iter()
            .filter(|m| !m.has_ended(now))
            .collect())
    }

    pub async fn get(&self, id: &str) -> Result<Option<Mission>> {
        self.dao.get_by_id(id).await
    }

    pub async fn refresh_view(&self) -> Result<()> {
        let list = self.dao.get_all().await?;
        self.view.send_replace(list);
        Ok(())
    }

    /// 全量同步；未发布的本地任务保留
    pub async fn sync(&self) -> Result<()> {
        info!("[MissionRepo] 🔄 开始同步任务...");
        let remote = match self.remote.fetch_all().await {
            Ok(list) => list,
            Err(e) => {
                error!("[MissionRepo] 拉取任务失败: {:#}", e);
                self.listener.on_sync_failed(format!("{:#}", e)).await;
                return Err(e);
            }
        };
        let remote: Vec<Mission> = remote
            .into_iter()
            .map(|mut m| {
                m.state = SyncState::Published;
                m
            })
            .collect();

        let synced: Vec<Mission> = self
            .dao
            .get_all()
            .await?
            .into_iter()
            .filter(|m| !m.state.is_local_only())
            .collect();

        let diff = diff_by_id(&synced, remote, |l, r| l == r);
        for mission in diff.upserts() {
            self.dao.upsert(mission).await?;
        }
        for id in diff.delete.iter() {
            warn!("[MissionRepo]   删除任务: {}", id);
            self.dao.delete(id).await?;
        }
        self.sync_state.mark_synced(TABLE_NAME, "", now_millis()).await?;

        let changed: Vec<Mission> = diff.upserts().cloned().collect();
        if !changed.is_empty() {
            self.listener.on_missions_changed(changed).await;
        }
        if !diff.delete.is_empty() {
            self.listener.on_missions_deleted(diff.delete.clone()).await;
        }
        self.refresh_view().await?;
        info!(
            "[MissionRepo] ✅ 任务同步完成 - 新增: {}, 更新: {}, 删除: {}",
            diff.insert.len(),
            diff.update.len(),
            diff.delete.len()
        );
        Ok(())
    }

    /// 应用实时推送的增量变更
    pub async fn apply_changes(&self, changes: Vec<DocumentChange<Mission>>) -> Result<()> {
        let mut changed = Vec::new();
        let mut deleted = Vec::new();
        for change in changes {
            match change {
                DocumentChange::Added(mut m) | DocumentChange::Modified(mut m) => {
                    m.state = SyncState::Published;
                    self.dao.upsert(&m).await?;
                    changed.push(m);
                }
                DocumentChange::Removed(id) => {
                    if self.dao.delete(&id).await? {
                        deleted.push(id);
                    }
                }
            }
        }
        if !changed.is_empty() {
            self.listener.on_missions_changed(changed).await;
        }
        if !deleted.is_empty() {
            self.listener.on_missions_deleted(deleted).await;
        }
        self.refresh_view().await
    }

    /// 发布新任务
    pub async fn create(&self, author_id: &str, draft: &MissionDraft) -> Result<Mission> {
        let draft = validate_draft(draft)?;
        let now = now_millis();
        let mission = Mission {
            id: generate_client_id("mission"),
            author_id: author_id.to_string(),
            title: draft.title,
            description: draft.description,
            location: draft.location,
            starts_at: draft.starts_at,
            ends_at: draft.ends_at,
            capacity: draft.capacity,
            participant_ids: Vec::new(),
            created_at: now,
            updated_at: now,
            state: SyncState::Draft,
        };
        self.dao.upsert(&mission).await?;
        info!("[MissionRepo] 📝 任务草稿已保存: {}", mission.id);
        self.publish(mission).await
    }

    pub async fn retry_publish(&self, id: &str) -> Result<Mission> {
        let mission = self.require(id).await?;
        if mission.state == SyncState::Published {
            return Ok(mission);
        }
        self.publish(mission).await
    }

    async fn publish(&self, mut mission: Mission) -> Result<Mission> {
        mission.state = SyncState::Publishing;
        self.dao.upsert(&mission).await?;
        self.refresh_view().await?;

        match self.remote.create(&mission).await {
            Ok(mut saved) => {
                saved.state = SyncState::Published;
                if saved.id != mission.id {
                    self.dao.delete(&mission.id).await?;
                }
                self.dao.upsert(&saved).await?;
                self.listener.on_missions_changed(vec![saved.clone()]).await;
                self.refresh_view().await?;
                info!("[MissionRepo] ✅ 任务已发布: {}", saved.id);
                Ok(saved)
            }
            Err(e) => {
                error!("[MissionRepo] ❌ 任务发布失败: {}, {:#}", mission.id, e);
                mission.state = SyncState::Error;
                self.dao.update_state(&mission.id, SyncState::Error).await?;
                self.listener.on_missions_changed(vec![mission]).await;
                self.refresh_view().await?;
                Err(e)
            }
        }
    }

    /// 编辑任务：已发布的先写服务器再写本地
    pub async fn update(&self, mission: &Mission) -> Result<Mission> {
        let existing = self.require(&mission.id).await?;
        let draft = validate_draft(&MissionDraft {
            title: mission.title.clone(),
            description: mission.description.clone(),
            location: mission.location.clone(),
            starts_at: mission.starts_at,
            ends_at: mission.ends_at,
            capacity: mission.capacity,
        })?;
        if let Some(cap) = draft.capacity {
            if (cap as usize) < existing.participant_ids.len() {
                return Err(ValidationError::Invalid("人数上限小于已报名人数".to_string()).into());
            }
        }

        let edited = Mission {
            title: draft.title,
            description: draft.description,
            location: draft.location,
            starts_at: draft.starts_at,
            ends_at: draft.ends_at,
            capacity: draft.capacity,
            updated_at: now_millis(),
            state: existing.state,
            ..existing.clone()
        };

        if existing.state.is_local_only() {
            self.dao.upsert(&edited).await?;
            return self.publish(edited).await;
        }

        let mut saved = self.remote.update(&edited).await?;
        saved.state = SyncState::Published;
        self.dao.upsert(&saved).await?;
        self.listener.on_missions_changed(vec![saved.clone()]).await;
        self.refresh_view().await?;
        Ok(saved)
    }

    /// 删除任务：先删本地，再删服务器
    pub async fn delete(&self, id: &str) -> Result<()> {
        let existing = self.dao.get_by_id(id).await?;
        self.dao.delete(id).await?;
        self.listener.on_missions_deleted(vec![id.to_string()]).await;
        self.refresh_view().await?;
        match existing {
            Some(m) if m.state.is_local_only() => Ok(()),
            _ => {
                self.remote.delete(id).await?;
                info!("[MissionRepo] 🗑️ 任务已删除: {}", id);
                Ok(())
            }
        }
    }

    /// 报名任务；已报名时直接返回
    pub async fn join(&self, mission_id: &str, user_id: &str) -> Result<Mission> {
        let mission = self.require(mission_id).await?;
        if mission.state != SyncState::Published {
            return Err(MissionError::NotPublished.into());
        }
        if mission.has_participant(user_id) {
            debug!("[MissionRepo] 用户 {} 已报名任务 {}", user_id, mission_id);
            return Ok(mission);
        }
        if mission.is_full() {
            warn!("[MissionRepo] 任务 {} 已满员", mission_id);
            return Err(MissionError::Full.into());
        }

        let mut saved = self.remote.join(mission_id, user_id).await?;
        saved.state = SyncState::Published;
        self.dao.upsert(&saved).await?;
        self.listener.on_missions_changed(vec![saved.clone()]).await;
        self.refresh_view().await?;
        info!("[MissionRepo] ✅ 用户 {} 报名任务 {}", user_id, mission_id);
        Ok(saved)
    }

    /// 取消报名；未报名时直接返回
    pub async fn leave(&self, mission_id: &str, user_id: &str) -> Result<Mission> {
        let mission = self.require(mission_id).await?;
        if !mission.has_participant(user_id) {
            return Ok(mission);
        }
        let mut saved = self.remote.leave(mission_id, user_id).await?;
        saved.state = SyncState::Published;
        self.dao.upsert(&saved).await?;
        self.listener.on_missions_changed(vec![saved.clone()]).await;
        self.refresh_view().await?;
        info!("[MissionRepo] 用户 {} 取消报名任务 {}", user_id, mission_id);
        Ok(saved)
    }

    async fn require(&self, id: &str) -> Result<Mission> {
        self.dao
            .get_by_id(id)
            .await?
            .ok_or_else(|| MissionError::NotFound(id.to_string()).into())
    }

    pub fn start_polling(self: &Arc<Self>, period: Duration) -> ListenerRegistration {
        spawn_polling("missions", self.clone(), period, |repo: Arc<Self>| async move {
            repo.sync().await
        })
    }

    pub async fn clear(&self) -> Result<()> {
        self.dao.clear().await?;
        self.view.send_replace(Vec::new());
        Ok(())
    }
}
