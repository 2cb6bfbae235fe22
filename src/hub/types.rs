use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::hub::error::ApiError;

/// 统一的 API 响应包装结构体（包含 errCode、errMsg、data）
/// data 字段可能为 null 或缺失，因此使用 Option<T>
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    #[serde(rename = "errCode")]
    pub err_code: i32,
    #[serde(rename = "errMsg", default)]
    pub err_msg: String,
    pub data: Option<T>,
}

/// 通用 HTTP 响应处理函数：校验 HTTP 状态与 errCode，并反序列化为 `ApiResponse<T>`
///
/// 失败时返回 [`ApiError`]（包在 anyhow 中，调用方可 downcast）。
pub async fn handle_http_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    operation_name: &str,
) -> anyhow::Result<ApiResponse<T>> {
    use tracing::{debug, error};

    let status = response.status();

    // body 只能读取一次
    let body_bytes = response.bytes().await.map_err(ApiError::from)?;
    let body_str = String::from_utf8_lossy(&body_bytes);
    debug!("[HTTP] {}响应 Body: {}", operation_name, body_str);

    if !status.is_success() {
        error!(
            "[HTTP] {}请求失败，HTTP状态: {}, 响应: {}",
            operation_name, status, body_str
        );
        return Err(ApiError::from_status(status, &body_str).into());
    }

    let api_resp: ApiResponse<T> = serde_json::from_slice(&body_bytes).map_err(|e| {
        error!(
            "[HTTP] {}反序列化失败: {:?}\n原始响应: {}",
            operation_name, e, body_str
        );
        ApiError::Decode(e.to_string())
    })?;

    if api_resp.err_code != 0 {
        error!(
            "[HTTP] {}服务器错误，错误码: {}, 错误信息: {}",
            operation_name, api_resp.err_code, api_resp.err_msg
        );
        return Err(ApiError::Business {
            code: api_resp.err_code,
            message: api_resp.err_msg,
        }
        .into());
    }

    Ok(api_resp)
}

/// 公告 / 任务的发布状态
///
/// 本地先以 draft 落库，远端写入时为 publishing，成功后 published，失败 error。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    Draft,
    Publishing,
    #[default]
    Published,
    Error,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Draft => "draft",
            SyncState::Publishing => "publishing",
            SyncState::Published => "published",
            SyncState::Error => "error",
        }
    }

    /// 仅存在于本地、尚未被服务器确认的状态
    pub fn is_local_only(&self) -> bool {
        !matches!(self, SyncState::Published)
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(SyncState::Draft),
            "publishing" => Ok(SyncState::Publishing),
            "published" => Ok(SyncState::Published),
            "error" => Ok(SyncState::Error),
            other => Err(anyhow::anyhow!("未知的发布状态: {}", other)),
        }
    }
}

/// 消息发送状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SendState {
    Sending,
    #[default]
    Sent,
    Failed,
}

impl SendState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SendState::Sending => "sending",
            SendState::Sent => "sent",
            SendState::Failed => "failed",
        }
    }
}

impl FromStr for SendState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sending" => Ok(SendState::Sending),
            "sent" => Ok(SendState::Sent),
            "failed" => Ok(SendState::Failed),
            other => Err(anyhow::anyhow!("未知的发送状态: {}", other)),
        }
    }
}

/// 当前时间（毫秒）
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_state_text_form_roundtrips_through_sqlite_column() {
        for state in [
            SyncState::Draft,
            SyncState::Publishing,
            SyncState::Published,
            SyncState::Error,
        ] {
            assert_eq!(state.as_str().parse::<SyncState>().unwrap(), state);
        }
        assert!("archived".parse::<SyncState>().is_err());
        assert!(SyncState::Error.is_local_only());
        assert!(!SyncState::Published.is_local_only());
    }

    #[test]
    fn api_response_tolerates_missing_data() {
        let resp: ApiResponse<Vec<String>> =
            serde_json::from_str(r#"{"errCode":0,"errMsg":""}"#).unwrap();
        assert!(resp.data.is_none());
        assert_eq!(
            serde_json::to_string(&SendState::Failed).unwrap(),
            "\"failed\""
        );
    }
}
