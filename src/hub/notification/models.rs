//! 推送令牌模型

use serde::{Deserialize, Serialize};

/// 设备推送令牌
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushToken {
    pub token: String,
    #[serde(rename = "userID")]
    pub user_id: String,
    pub platform: String,
    pub updated_at: i64,
    /// 是否已成功上报到服务器（只保存在本地）
    #[serde(skip)]
    pub uploaded: bool,
}
