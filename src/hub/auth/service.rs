//! 认证服务层
//!
//! 组合身份服务与用户资料服务：登录后必须能取到用户资料，注册前必须通过名单校验。

use crate::hub::auth::api::IdentityProvider;
use crate::hub::auth::dao::SessionDao;
use crate::hub::auth::models::{normalize_email, AuthSession, RegisterRequest, MIN_PASSWORD_LEN};
use crate::hub::error::AuthError;
use crate::hub::types::now_millis;
use crate::hub::user::{User, UserDao, UserRemote, UserRole};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

/// 认证服务
pub struct AuthService {
    provider: Arc<dyn IdentityProvider>,
    users: Arc<dyn UserRemote>,
    session_dao: SessionDao,
    user_dao: UserDao,
    session: RwLock<Option<AuthSession>>,
}

impl AuthService {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        users: Arc<dyn UserRemote>,
        session_dao: SessionDao,
        user_dao: UserDao,
    ) -> Self {
        Self {
            provider,
            users,
            session_dao,
            user_dao,
            session: RwLock::new(None),
        }
    }

    /// 登录：身份服务校验通过后拉取用户资料；资料不存在时退出并返回 UserNotFound
    pub async fn login(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let email = normalize_email(email)?;
        if password.is_empty() {
            return Err(AuthError::InvalidCredentials);
        }

        let session = self.provider.sign_in(&email, password).await?;
        info!("[Auth] 身份校验通过，userID: {}", session.user_id);

        let profile = match self.users.get_user(&session.user_id).await {
            Ok(profile) => profile,
            Err(e) => {
                self.sign_out_quietly(&session).await;
                return Err(AuthError::from_anyhow(e));
            }
        };
        let Some(user) = profile else {
            warn!("[Auth] ⚠️ 用户 {} 没有资料记录，撤销登录", session.user_id);
            self.sign_out_quietly(&session).await;
            return Err(AuthError::UserNotFound);
        };

        self.persist(session, &user).await?;
        info!("[Auth] ✅ 登录成功: {}", user.display_name());
        Ok(user)
    }

    /// 注册：名单校验 → 创建身份 → 创建资料
    pub async fn register(&self, request: &RegisterRequest) -> Result<User, AuthError> {
        let email = normalize_email(&request.email)?;
        if request.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::WeakPassword);
        }

        let allowed = self
            .users
            .is_email_allowed(&email)
            .await
            .map_err(AuthError::from_anyhow)?;
        if !allowed {
            warn!("[Auth] 🚫 邮箱 {} 不在允许注册名单中", email);
            return Err(AuthError::Forbidden);
        }

        let session = self.provider.sign_up(&email, &request.password).await?;
        let now = now_millis();
        let profile = User {
            id: session.user_id.clone(),
            email: email.clone(),
            first_name: request.first_name.trim().to_string(),
            last_name: request.last_name.trim().to_string(),
            role: UserRole::Student,
            school_class: request.school_class.trim().to_string(),
            avatar_url: None,
            created_at: now,
            updated_at: now,
        };

        let user = match self.users.create_user(&profile).await {
            Ok(user) => user,
            Err(e) => {
                // 身份已创建但资料写入失败：两者之间没有事务，只能提示重试
                error!("[Auth] 创建用户资料失败: {:#}", e);
                self.sign_out_quietly(&session).await;
                return Err(AuthError::from_anyhow(e));
            }
        };

        self.persist(session, &user).await?;
        info!("[Auth] ✅ 注册成功: {}", user.id);
        Ok(user)
    }

    /// 退出登录：远端退出失败不影响本地清理
    pub async fn logout(&self) -> Result<(), AuthError> {
        let session = self.session.write().await.take();
        if let Some(session) = session {
            self.sign_out_quietly(&session).await;
        }
        self.session_dao.clear().await.map_err(AuthError::from_anyhow)?;
        info!("[Auth] 👋 已退出登录");
        Ok(())
    }

    pub async fn send_password_reset(&self, email: &str) -> Result<(), AuthError> {
        let email = normalize_email(email)?;
        self.provider.send_password_reset(&email).await
    }

    /// 从本地恢复会话；已过期则尝试刷新，刷新失败时清除本地会话
    pub async fn restore_session(&self) -> Result<Option<AuthSession>, AuthError> {
        let Some(stored) = self.session_dao.load().await.map_err(AuthError::from_anyhow)? else {
            return Ok(None);
        };

        if !stored.is_expired(now_millis()) {
            *self.session.write().await = Some(stored.clone());
            info!("[Auth] 已恢复本地会话: {}", stored.user_id);
            return Ok(Some(stored));
        }

        if stored.refresh_token.is_empty() {
            warn!("[Auth] 本地会话已过期且无法刷新");
            self.session_dao.clear().await.map_err(AuthError::from_anyhow)?;
            return Ok(None);
        }

        match self.provider.refresh(&stored.refresh_token).await {
            Ok(refreshed) => {
                self.session_dao
                    .save(&refreshed)
                    .await
                    .map_err(AuthError::from_anyhow)?;
                *self.session.write().await = Some(refreshed.clone());
                Ok(Some(refreshed))
            }
            Err(AuthError::Network(e)) => Err(AuthError::Network(e)),
            Err(e) => {
                warn!("[Auth] 刷新会话失败，清除本地会话: {}", e);
                self.session_dao.clear().await.map_err(AuthError::from_anyhow)?;
                Ok(None)
            }
        }
    }

    /// 主动刷新当前会话的令牌
    pub async fn refresh_session(&self) -> Result<AuthSession, AuthError> {
        let current = self.current_session().await.ok_or(AuthError::NotSignedIn)?;
        let refreshed = self.provider.refresh(&current.refresh_token).await?;
        self.session_dao
            .save(&refreshed)
            .await
            .map_err(AuthError::from_anyhow)?;
        *self.session.write().await = Some(refreshed.clone());
        Ok(refreshed)
    }

    pub async fn current_session(&self) -> Option<AuthSession> {
        self.session.read().await.clone()
    }

    /// 当前用户资料（本地缓存）
    pub async fn current_user(&self) -> Result<Option<User>, AuthError> {
        let Some(session) = self.current_session().await else {
            return Ok(None);
        };
        self.user_dao
            .get_user(&session.user_id)
            .await
            .map_err(AuthError::from_anyhow)
    }

    /// 注销账号：删除资料与身份，然后清理本地
    pub async fn delete_account(&self) -> Result<(), AuthError> {
        let session = self.current_session().await.ok_or(AuthError::NotSignedIn)?;
        self.users
            .delete_user(&session.user_id)
            .await
            .map_err(AuthError::from_anyhow)?;
        self.provider.delete_account(&session).await?;
        self.user_dao
            .delete_user(&session.user_id)
            .await
            .map_err(AuthError::from_anyhow)?;
        *self.session.write().await = None;
        self.session_dao.clear().await.map_err(AuthError::from_anyhow)?;
        info!("[Auth] 账号已注销: {}", session.user_id);
        Ok(())
    }

    async fn persist(&self, session: AuthSession, user: &User) -> Result<(), AuthError> {
        self.session_dao
            .save(&session)
            .await
            .map_err(AuthError::from_anyhow)?;
        self.user_dao
            .upsert_user(user)
            .await
            .map_err(AuthError::from_anyhow)?;
        *self.session.write().await = Some(session);
        Ok(())
    }

    async fn sign_out_quietly(&self, session: &AuthSession) {
        if let Err(e) = self.provider.sign_out(session).await {
            warn!("[Auth] 远端退出登录失败（忽略）: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::db::memory_pool;
    use crate::hub::error::ApiError;
    use crate::hub::testing::{sample_user, MockIdentityProvider, MockUserRemote};

    struct Fixture {
        provider: Arc<MockIdentityProvider>,
        users: Arc<MockUserRemote>,
        service: AuthService,
    }

    async fn fixture() -> Fixture {
        let pool = memory_pool().await;
        let provider = Arc::new(MockIdentityProvider::default());
        let users = Arc::new(MockUserRemote::default());
        let service = AuthService::new(
            provider.clone(),
            users.clone(),
            SessionDao::new(pool.clone()),
            UserDao::new(pool),
        );
        Fixture {
            provider,
            users,
            service,
        }
    }

    fn register_request(email: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.to_string(),
            password: "secret123".to_string(),
            first_name: "Ana".to_string(),
            last_name: "Lopez".to_string(),
            school_class: "3B".to_string(),
        }
    }

    #[tokio::test]
    async fn login_throws_user_not_found_when_profile_missing() {
        let f = fixture().await;
        f.provider.add_account("ghost@school.test", "secret123", "u-ghost");

        let err = f.service.login("ghost@school.test", "secret123").await.unwrap_err();
        assert_eq!(err, AuthError::UserNotFound);
        assert_eq!(f.provider.sign_out_calls(), 1);
        assert!(f.service.current_session().await.is_none());
    }

    #[tokio::test]
    async fn login_persists_session_and_caches_user() {
        let f = fixture().await;
        f.provider.add_account("ana@school.test", "secret123", "u1");
        f.users.insert(sample_user("u1"));

        let user = f.service.login(" ANA@school.test ", "secret123").await.unwrap();
        assert_eq!(user.id, "u1");
        assert_eq!(f.service.current_session().await.unwrap().user_id, "u1");
        assert_eq!(f.service.current_user().await.unwrap().unwrap().id, "u1");
    }

    #[tokio::test]
    async fn login_with_wrong_password_is_invalid_credentials() {
        let f = fixture().await;
        f.provider.add_account("ana@school.test", "secret123", "u1");
        let err = f.service.login("ana@school.test", "nope").await.unwrap_err();
        assert_eq!(err, AuthError::InvalidCredentials);
    }

    #[tokio::test]
    async fn register_throws_forbidden_when_email_not_allowed() {
        let f = fixture().await;
        let err = f
            .service
            .register(&register_request("stranger@gmail.test"))
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::Forbidden);
        assert_eq!(f.provider.sign_up_calls(), 0);
    }

    #[tokio::test]
    async fn register_creates_profile_for_allowed_email() {
        let f = fixture().await;
        f.users.allow_email("ana@school.test");

        let user = f
            .service
            .register(&register_request("Ana@School.test"))
            .await
            .unwrap();
        assert_eq!(user.email, "ana@school.test");
        assert_eq!(user.role, UserRole::Student);
        assert!(f.users.get(&user.id).is_some());
        assert!(f.service.current_session().await.is_some());
    }

    #[tokio::test]
    async fn register_rejects_weak_password_before_network() {
        let f = fixture().await;
        let mut req = register_request("ana@school.test");
        req.password = "123".to_string();
        assert_eq!(f.service.register(&req).await.unwrap_err(), AuthError::WeakPassword);
    }

    #[tokio::test]
    async fn network_failure_during_profile_fetch_is_reported() {
        let f = fixture().await;
        f.provider.add_account("ana@school.test", "secret123", "u1");
        f.users.fail_with(ApiError::Unreachable("offline".to_string()));

        let err = f.service.login("ana@school.test", "secret123").await.unwrap_err();
        assert!(matches!(err, AuthError::Network(ApiError::Unreachable(_))));
    }

    #[tokio::test]
    async fn logout_clears_session_and_restore_finds_nothing() {
        let f = fixture().await;
        f.provider.add_account("ana@school.test", "secret123", "u1");
        f.users.insert(sample_user("u1"));
        f.service.login("ana@school.test", "secret123").await.unwrap();

        f.service.logout().await.unwrap();
        assert!(f.service.current_session().await.is_none());
        assert!(f.service.restore_session().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn restore_session_refreshes_expired_token() {
        let f = fixture().await;
        f.provider.add_account("ana@school.test", "secret123", "u1");
        f.users.insert(sample_user("u1"));
        f.provider.expire_sessions_immediately();
        f.service.login("ana@school.test", "secret123").await.unwrap();

        let restored = f.service.restore_session().await.unwrap().unwrap();
        assert_eq!(restored.user_id, "u1");
        assert_eq!(f.provider.refresh_calls(), 1);
    }
}
