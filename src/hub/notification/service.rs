//! 推送令牌服务：令牌变化时上报，退出登录时注销

use crate::hub::notification::api::PushTokenRemote;
use crate::hub::notification::dao::PushTokenDao;
use crate::hub::notification::models::PushToken;
use crate::hub::types::now_millis;
use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 推送令牌服务
pub struct PushTokenService {
    remote: Arc<dyn PushTokenRemote>,
    dao: PushTokenDao,
}

impl PushTokenService {
    pub fn new(remote: Arc<dyn PushTokenRemote>, dao: PushTokenDao) -> Self {
        Self { remote, dao }
    }

    pub async fn current(&self, user_id: &str) -> Result<Option<PushToken>> {
        self.dao.get(user_id).await
    }

    /// 上报推送令牌；同一用户的同一令牌已上报过时不重复上报。返回是否发起了上报
    pub async fn update_token(&self, user_id: &str, token: &str, platform: &str) -> Result<bool> {
        let token = token.trim();
        if token.is_empty() {
            warn!("[Push] 忽略空的推送令牌");
            return Ok(false);
        }
        if let Some(existing) = self.dao.get(user_id).await? {
            if existing.uploaded && existing.token == token {
                debug!("[Push] 推送令牌未变化，跳过上报");
                return Ok(false);
            }
        }

        let mut record = PushToken {
            token: token.to_string(),
            user_id: user_id.to_string(),
            platform: platform.to_string(),
            updated_at: now_millis(),
            uploaded: false,
        };
        // 先保存未上报状态，上报失败后下次启动还会重试
        self.dao.save(&record).await?;
        self.remote.register(&record).await?;
        record.uploaded = true;
        self.dao.save(&record).await?;
        info!("[Push] ✅ 推送令牌已更新，userID: {}", user_id);
        Ok(true)
    }

    /// 注销推送令牌（服务器失败只记录日志），并删除本地记录
    pub async fn clear(&self, user_id: &str) -> Result<()> {
        if let Some(existing) = self.dao.get(user_id).await? {
            if existing.uploaded {
                if let Err(e) = self.remote.unregister(user_id, &existing.token).await {
                    warn!("[Push] 注销推送令牌失败: {:#}", e);
                }
            }
        }
        self.dao.delete(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::db::memory_pool;
    use crate::hub::error::ApiError;
    use crate::hub::testing::MockPushTokenRemote;

    async fn service() -> (Arc<MockPushTokenRemote>, PushTokenService) {
        let remote = Arc::new(MockPushTokenRemote::default());
        let dao = PushTokenDao::new(memory_pool().await);
        (remote.clone(), PushTokenService::new(remote, dao))
    }

    #[tokio::test]
    async fn same_token_is_uploaded_once() -> Result<()> {
        let (remote, service) = service().await;
        assert!(service.update_token("u1", "tok-1", "ios").await?);
        assert!(!service.update_token("u1", "tok-1", "ios").await?);
        assert!(service.update_token("u1", "tok-2", "ios").await?);
        assert_eq!(remote.registered(), vec!["tok-1".to_string(), "tok-2".to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn failed_upload_is_retried() -> Result<()> {
        let (remote, service) = service().await;
        remote.fail_with(ApiError::Timeout);
        assert!(service.update_token("u1", "tok", "android").await.is_err());
        assert!(!service.current("u1").await?.unwrap().uploaded);

        remote.recover();
        assert!(service.update_token("u1", "tok", "android").await?);
        assert!(service.current("u1").await?.unwrap().uploaded);
        Ok(())
    }

    #[tokio::test]
    async fn clear_ignores_remote_failure() -> Result<()> {
        let (remote, service) = service().await;
        service.update_token("u1", "tok", "ios").await?;
        remote.fail_with(ApiError::Unreachable("offline".to_string()));
        service.clear("u1").await?;
        assert!(service.current("u1").await?.is_none());
        Ok(())
    }
}
