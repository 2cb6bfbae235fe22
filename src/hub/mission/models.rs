//! 任务模型定义

use crate::hub::reconcile::Identifiable;
use crate::hub::serialization::deserialize_null_default;
use crate::hub::types::SyncState;
use serde::{Deserialize, Serialize};

/// 任务（志愿活动）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mission {
    pub id: String,
    #[serde(rename = "authorID")]
    pub author_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location: String,
    pub starts_at: i64,
    #[serde(default)]
    pub ends_at: Option<i64>,
    /// 人数上限，None 表示不限
    #[serde(default)]
    pub capacity: Option<u32>,
    #[serde(
        rename = "participantIDs",
        default,
        deserialize_with = "deserialize_null_default"
    )]
    pub participant_ids: Vec<String>,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
    #[serde(default)]
    pub state: SyncState,
}

impl Mission {
    pub fn is_full(&self) -> bool {
        match self.capacity {
            Some(cap) => self.participant_ids.len() >= cap as usize,
            None => false,
        }
    }

    pub fn has_participant(&self, user_id: &str) -> bool {
        self.participant_ids.iter().any(|id| id == user_id)
    }

    /// 已结束：有结束时间按结束时间判断，否则按开始时间
    pub fn has_ended(&self, now: i64) -> bool {
        self.ends_at.unwrap_or(self.starts_at) < now
    }

    pub fn remaining_places(&self) -> Option<u32> {
        self.capacity
            .map(|cap| cap.saturating_sub(self.participant_ids.len() as u32))
    }
}

impl Identifiable for Mission {
    fn id(&self) -> &str {
        &self.id
    }
}

/// 创建任务时的输入
#[derive(Debug, Clone, Default)]
pub struct MissionDraft {
    pub title: String,
    pub description: String,
    pub location: String,
    pub starts_at: i64,
    pub ends_at: Option<i64>,
    pub capacity: Option<u32>,
}
