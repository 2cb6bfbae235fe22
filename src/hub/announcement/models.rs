//! 公告模型定义

use crate::hub::reconcile::Identifiable;
use crate::hub::types::SyncState;
use serde::{Deserialize, Serialize};

/// 公告（新闻）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Announcement {
    pub id: String,
    #[serde(rename = "authorID")]
    pub author_id: String,
    pub title: String,
    pub content: String,
    #[serde(rename = "imageURL", default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
    /// 服务器返回的公告不带该字段，视为已发布
    #[serde(default)]
    pub state: SyncState,
}

impl Identifiable for Announcement {
    fn id(&self) -> &str {
        &self.id
    }
}

/// 公告列表排序：最新的在前，时间相同按 id
pub fn sort_newest_first(list: &mut [Announcement]) {
    list.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
}
