//! 通用超时工具：让操作与计时器赛跑，先完成的一方胜出，另一方被取消

use crate::hub::error::ApiError;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// 在 `limit` 内等待 `fut` 完成，超时则丢弃（取消）该 future 并返回 [`ApiError::Timeout`]
pub async fn with_timeout<F, T>(limit: Duration, operation: &str, fut: F) -> anyhow::Result<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            warn!("[Timeout] {} 超过 {:?} 未完成，已取消", operation, limit);
            Err(ApiError::Timeout.into())
        }
    }
}
