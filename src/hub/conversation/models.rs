//! 会话模型定义

use crate::hub::reconcile::Identifiable;
use crate::hub::serialization::deserialize_null_default;
use serde::{Deserialize, Serialize};

/// 会话
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    #[serde(
        rename = "participantIDs",
        default,
        deserialize_with = "deserialize_null_default"
    )]
    pub participant_ids: Vec<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub last_message: String,
    #[serde(default)]
    pub last_message_at: i64,
    #[serde(default)]
    pub unread_count: u32,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
}

impl Conversation {
    pub fn has_participant(&self, user_id: &str) -> bool {
        self.participant_ids.iter().any(|id| id == user_id)
    }

    /// 排序后的参与者集合，用于判断两个会话是否是同一组人
    pub fn participant_key(&self) -> Vec<String> {
        normalize_participants(&self.participant_ids)
    }

    /// 列表展示时的排序时间：没有消息时用创建时间
    pub fn activity_at(&self) -> i64 {
        self.last_message_at.max(self.created_at)
    }
}

impl Identifiable for Conversation {
    fn id(&self) -> &str {
        &self.id
    }
}

/// 去掉空白和重复 id 并排序
pub fn normalize_participants(ids: &[String]) -> Vec<String> {
    let mut out: Vec<String> = ids
        .iter()
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .collect();
    out.sort();
    out.dedup();
    out
}

/// 会话列表排序：最近活跃的在前
pub fn sort_by_activity(list: &mut [Conversation]) {
    list.sort_by(|a, b| {
        b.activity_at()
            .cmp(&a.activity_at())
            .then_with(|| a.id.cmp(&b.id))
    });
}
