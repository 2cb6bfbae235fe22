//! 本地缓存与远端数据的差异计算
//!
//! 各仓库的同步流程都是「拉取 → 对比 → upsert / delete」，这里提供共用的对比逻辑，
//! 以及实时监听推送的增量变更类型。

use serde::de::DeserializeOwned;
use std::collections::{HashMap, HashSet};

/// 以字符串 id 标识的实体
pub trait Identifiable {
    fn id(&self) -> &str;
}

/// 对比结果
#[derive(Debug, Clone, PartialEq)]
pub struct SyncDiff<T> {
    /// 远端有、本地没有
    pub insert: Vec<T>,
    /// 两边都有但内容不同（取远端版本）
    pub update: Vec<T>,
    /// 本地有、远端没有的 id（已排序）
    pub delete: Vec<String>,
}

impl<T> SyncDiff<T> {
    pub fn is_empty(&self) -> bool {
        self.insert.is_empty() && self.update.is_empty() && self.delete.is_empty()
    }

    /// 需要写入本地的实体（新增 + 更新）
    pub fn upserts(&self) -> impl Iterator<Item = &T> {
        self.insert.iter().chain(self.update.iter())
    }
}

/// 按 id 对比本地与远端列表
///
/// `same` 判断同一 id 的两条记录是否无需更新。远端列表中重复的 id 以最后一条为准。
pub fn diff_by_id<T, F>(local: &[T], remote: Vec<T>, same: F) -> SyncDiff<T>
where
    T: Identifiable,
    F: Fn(&T, &T) -> bool,
{
    let local_map: HashMap<&str, &T> = local.iter().map(|item| (item.id(), item)).collect();

    // 去重，保留最后一次出现的位置顺序
    let mut order: Vec<String> = Vec::new();
    let mut remote_map: HashMap<String, T> = HashMap::new();
    for item in remote {
        let id = item.id().to_string();
        if remote_map.insert(id.clone(), item).is_none() {
            order.push(id);
        }
    }

    let mut insert = Vec::new();
    let mut update = Vec::new();
    for id in order.iter() {
        let Some(remote_item) = remote_map.remove(id) else {
            continue;
        };
        match local_map.get(id.as_str()) {
            None => insert.push(remote_item),
            Some(local_item) if !same(*local_item, &remote_item) => update.push(remote_item),
            Some(_) => {}
        }
    }

    let remote_ids: HashSet<&str> = order.iter().map(|id| id.as_str()).collect();
    let mut delete: Vec<String> = local
        .iter()
        .map(|item| item.id())
        .filter(|id| !remote_ids.contains(id))
        .map(|id| id.to_string())
        .collect();
    delete.sort();
    delete.dedup();

    SyncDiff {
        insert,
        update,
        delete,
    }
}

/// 实时监听推送的单条变更
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentChange<T> {
    Added(T),
    Modified(T),
    Removed(String),
}

impl<T: Identifiable> DocumentChange<T> {
    pub fn id(&self) -> &str {
        match self {
            DocumentChange::Added(item) | DocumentChange::Modified(item) => item.id(),
            DocumentChange::Removed(id) => id,
        }
    }
}

/// 变更的原始形态（实时帧中的 JSON），按集合再反序列化为具体实体
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct RawChange {
    pub kind: ChangeKind,
    pub id: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

impl RawChange {
    /// 转换为强类型变更；added/modified 缺少 data 时报错
    pub fn decode<T: DeserializeOwned>(self) -> anyhow::Result<DocumentChange<T>> {
        match self.kind {
            ChangeKind::Removed => Ok(DocumentChange::Removed(self.id)),
            kind => {
                let data = self
                    .data
                    .ok_or_else(|| anyhow::anyhow!("变更 {} 缺少 data 字段", self.id))?;
                let item: T = serde_json::from_value(data)?;
                Ok(match kind {
                    ChangeKind::Added => DocumentChange::Added(item),
                    _ => DocumentChange::Modified(item),
                })
            }
        }
    }
}

/// 批量解码，跳过无法解析的条目并返回其 id
pub fn decode_changes<T: DeserializeOwned>(
    raw: Vec<RawChange>,
) -> (Vec<DocumentChange<T>>, Vec<String>) {
    let mut changes = Vec::with_capacity(raw.len());
    let mut rejected = Vec::new();
    for change in raw {
        let id = change.id.clone();
        match change.decode::<T>() {
            Ok(c) => changes.push(c),
            Err(_) => rejected.push(id),
        }
    }
    (changes, rejected)
}
