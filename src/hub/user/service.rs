//! 用户仓库：本地缓存优先，缺失时回源服务器

use crate::hub::error::require_text;
use crate::hub::types::now_millis;
use crate::hub::user::api::UserRemote;
use crate::hub::user::dao::UserDao;
use crate::hub::user::models::User;
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

const NAME_MAX_LEN: usize = 50;

/// 用户仓库
pub struct UserRepository {
    remote: Arc<dyn UserRemote>,
    dao: UserDao,
}

impl UserRepository {
    pub fn new(remote: Arc<dyn UserRemote>, dao: UserDao) -> Self {
        Self { remote, dao }
    }

    /// 获取用户：先查本地缓存，未命中再请求服务器并缓存
    pub async fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        if let Some(user) = self.dao.get_user(user_id).await? {
            debug!("[UserRepo] 命中本地缓存: {}", user_id);
            return Ok(Some(user));
        }
        self.refresh_user(user_id).await
    }

    /// 强制从服务器刷新用户资料；服务器已无此用户时删除本地缓存
    pub async fn refresh_user(&self, user_id: &str) -> Result<Option<User>> {
        match self.remote.get_user(user_id).await? {
            Some(user) => {
                self.dao.upsert_user(&user).await?;
                Ok(Some(user))
            }
            None => {
                warn!("[UserRepo] 服务器不存在用户 {}，清理本地缓存", user_id);
                self.dao.delete_user(user_id).await?;
                Ok(None)
            }
        }
    }

    /// 批量获取用户，按传入顺序返回；缺失的部分从服务器补齐
    pub async fn get_users(&self, user_ids: &[String]) -> Result<Vec<User>> {
        let mut found: HashMap<String, User> = HashMap::new();
        let mut missing: Vec<String> = Vec::new();
        for id in user_ids {
            if found.contains_key(id) || missing.contains(id) {
                continue;
            }
            match self.dao.get_user(id).await? {
                Some(user) => {
                    found.insert(id.clone(), user);
                }
                None => missing.push(id.clone()),
            }
        }

        if !missing.is_empty() {
            debug!("[UserRepo] 本地缺失 {} 个用户，回源服务器", missing.len());
            for user in self.remote.get_users(&missing).await? {
                self.dao.upsert_user(&user).await?;
                found.insert(user.id.clone(), user);
            }
        }

        let mut seen = std::collections::HashSet::new();
        Ok(user_ids
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .filter_map(|id| found.get(id).cloned())
            .collect())
    }

    /// 更新个人资料：先写服务器，成功后写本地
    pub async fn update_profile(&self, user: &User) -> Result<User> {
        let mut user = user.clone();
        user.first_name = require_text("名", &user.first_name, NAME_MAX_LEN)?;
        user.last_name = require_text("姓", &user.last_name, NAME_MAX_LEN)?;
        user.school_class = user.school_class.trim().to_string();
        user.updated_at = now_millis();

        let saved = self.remote.update_user(&user).await?;
        self.dao.upsert_user(&saved).await?;
        info!("[UserRepo] ✅ 个人资料已更新: {}", saved.id);
        Ok(saved)
    }

    /// 删除用户：先删服务器，再删本地
    pub async fn delete_user(&self, user_id: &str) -> Result<()> {
        self.remote.delete_user(user_id).await?;
        self.dao.delete_user(user_id).await?;
        info!("[UserRepo] 🗑️ 用户已删除: {}", user_id);
        Ok(())
    }

    /// 直接写入本地缓存（登录 / 注册后使用）
    pub async fn cache_user(&self, user: &User) -> Result<()> {
        self.dao.upsert_user(user).await
    }

    pub async fn clear_cache(&self) -> Result<()> {
        self.dao.clear().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::db::memory_pool;
    use crate::hub::error::ValidationError;
    use crate::hub::testing::{sample_user, MockUserRemote};

    async fn repo_with(remote: Arc<MockUserRemote>) -> UserRepository {
        UserRepository::new(remote, UserDao::new(memory_pool().await))
    }

    #[tokio::test]
    async fn get_user_caches_remote_result() -> Result<()> {
        let remote = Arc::new(MockUserRemote::default());
        remote.insert(sample_user("u1"));
        let repo = repo_with(remote.clone()).await;

        assert!(repo.get_user("u1").await?.is_some());
        assert!(repo.get_user("u1").await?.is_some());
        assert_eq!(remote.get_user_calls(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn refresh_removes_users_gone_from_server() -> Result<()> {
        let remote = Arc::new(MockUserRemote::default());
        remote.insert(sample_user("u1"));
        let repo = repo_with(remote.clone()).await;
        repo.get_user("u1").await?;

        remote.remove("u1");
        assert!(repo.refresh_user("u1").await?.is_none());
        assert!(repo.get_user("u1").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn get_users_keeps_order_and_fills_gaps() -> Result<()> {
        let remote = Arc::new(MockUserRemote::default());
        for id in ["a", "b", "c"] {
            remote.insert(sample_user(id));
        }
        let repo = repo_with(remote.clone()).await;
        repo.cache_user(&sample_user("b")).await?;

        let ids: Vec<String> = ["c", "b", "a", "c", "zzz"].iter().map(|s| s.to_string()).collect();
        let users = repo.get_users(&ids).await?;
        let got: Vec<&str> = users.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(got, vec!["c", "b", "a"]);
        Ok(())
    }

    #[tokio::test]
    async fn update_profile_validates_names() -> Result<()> {
        let remote = Arc::new(MockUserRemote::default());
        remote.insert(sample_user("u1"));
        let repo = repo_with(remote.clone()).await;

        let mut user = sample_user("u1");
        user.first_name = "   ".to_string();
        let err = repo.update_profile(&user).await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<ValidationError>(),
            Some(&ValidationError::Empty("名"))
        );

        user.first_name = "  Lina ".to_string();
        let saved = repo.update_profile(&user).await?;
        assert_eq!(saved.first_name, "Lina");
        assert_eq!(repo.get_user("u1").await?.unwrap().first_name, "Lina");
        Ok(())
    }
}
