//! 公告监听器回调接口

use crate::hub::announcement::models::Announcement;
use async_trait::async_trait;

/// 公告监听器
#[async_trait]
pub trait AnnouncementListener: Send + Sync {
    /// 公告新增或变更
    async fn on_announcements_changed(&self, announcements: Vec<Announcement>);

    /// 公告被删除
    async fn on_announcements_deleted(&self, ids: Vec<String>);

    /// 同步失败
    async fn on_sync_failed(&self, reason: String);
}

/// 空实现（默认监听器）
pub struct EmptyAnnouncementListener;

#[async_trait]
impl AnnouncementListener for EmptyAnnouncementListener {
    async fn on_announcements_changed(&self, _announcements: Vec<Announcement>) {}
    async fn on_announcements_deleted(&self, _ids: Vec<String>) {}
    async fn on_sync_failed(&self, _reason: String) {}
}
