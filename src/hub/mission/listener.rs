//! 任务监听器回调接口

use crate::hub::mission::models::Mission;
use async_trait::async_trait;

/// 任务监听器
#[async_trait]
pub trait MissionListener: Send + Sync {
    async fn on_missions_changed(&self, missions: Vec<Mission>);

    async fn on_missions_deleted(&self, ids: Vec<String>);

    async fn on_sync_failed(&self, reason: String);
}

/// 空实现（默认监听器）
pub struct EmptyMissionListener;

#[async_trait]
impl MissionListener for EmptyMissionListener {
    async fn on_missions_changed(&self, _missions: Vec<Mission>) {}
    async fn on_missions_deleted(&self, _ids: Vec<String>) {}
    async fn on_sync_failed(&self, _reason: String) {}
}
