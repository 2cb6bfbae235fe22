//! SchoolHub 客户端门面
//!
//! 持有数据库连接池与认证服务；登录成功后用带 Bearer token 的 HTTP 客户端组装
//! [`Workspace`]，并负责实时连接的建立与会话页面的监听注册。

use crate::hub::auth::{AuthApi, AuthService, RegisterRequest, SessionDao};
use crate::hub::config::ClientConfig;
use crate::hub::db::create_sqlite_pool;
use crate::hub::error::AuthError;
use crate::hub::http::ApiClient;
use crate::hub::message::Message;
use crate::hub::realtime::{Collection, RealtimeConnection};
use crate::hub::registration::ListenerRegistration;
use crate::hub::user::{User, UserApi, UserDao};
use crate::hub::workspace::{Listeners, Remotes, SnapshotRouter, Workspace};
use anyhow::{Context, Result};
use sqlx::{Pool, Sqlite};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

/// SchoolHub 客户端
pub struct SchoolHubClient {
    config: ClientConfig,
    db: Pool<Sqlite>,
    auth: AuthService,
    listeners: Listeners,
    workspace: RwLock<Option<Arc<Workspace>>>,
    realtime: Mutex<Option<RealtimeConnection>>,
}

impl SchoolHubClient {
    /// 打开本地数据库并创建认证服务
    pub async fn new(config: ClientConfig) -> Result<Self> {
        let db = create_sqlite_pool(&config.db_url, config.db_max_connections).await?;
        // 登录前的请求不带认证头
        let public_api = ApiClient::new(
            reqwest::Client::new(),
            config.api_base_url.clone(),
            config.request_timeout(),
        );
        let auth = AuthService::new(
            Arc::new(AuthApi::new(public_api.clone())),
            Arc::new(UserApi::new(public_api)),
            SessionDao::new(db.clone()),
            UserDao::new(db.clone()),
        );
        Ok(Self {
            config,
            db,
            auth,
            listeners: Listeners::default(),
            workspace: RwLock::new(None),
            realtime: Mutex::new(None),
        })
    }

    /// 注册监听器（需在登录前调用）
    pub fn with_listeners(mut self, listeners: Listeners) -> Self {
        self.listeners = listeners;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn auth(&self) -> &AuthService {
        &self.auth
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let user = self.auth.login(email, password).await?;
        self.open_workspace().await.map_err(AuthError::from_anyhow)?;
        Ok(user)
    }

    pub async fn register(&self, request: &RegisterRequest) -> Result<User, AuthError> {
        let user = self.auth.register(request).await?;
        self.open_workspace().await.map_err(AuthError::from_anyhow)?;
        Ok(user)
    }

    /// 启动时恢复上次的登录状态
    pub async fn restore_session(&self) -> Result<Option<User>, AuthError> {
        if self.auth.restore_session().await?.is_none() {
            return Ok(None);
        }
        self.open_workspace().await.map_err(AuthError::from_anyhow)?;
        self.auth.current_user().await
    }

    /// 退出登录：断开实时连接、注销推送令牌、清理本地缓存
    pub async fn logout(&self) -> Result<(), AuthError> {
        self.disconnect_realtime().await;
        let workspace = self.workspace.write().await.take();
        if let Some(ws) = workspace {
            if let Err(e) = ws.push.clear(&ws.user_id).await {
                warn!("[Client] 清理推送令牌失败: {:#}", e);
            }
            if let Err(e) = ws.clear_local().await {
                warn!("[Client] 清理本地缓存失败: {:#}", e);
            }
        }
        self.auth.logout().await
    }

    async fn open_workspace(&self) -> Result<Arc<Workspace>> {
        let session = self
            .auth
            .current_session()
            .await
            .ok_or(AuthError::NotSignedIn)?;
        let http_client = ApiClient::authorized_http_client(&session.id_token)?;
        let api = ApiClient::new(
            http_client,
            self.config.api_base_url.clone(),
            self.config.request_timeout(),
        );
        let workspace = Arc::new(Workspace::new(
            &session.user_id,
            self.db.clone(),
            Remotes::http(api),
            self.listeners.clone(),
        ));
        workspace
            .dispatcher
            .set_current_user(Some(session.user_id.clone()))
            .await;
        *self.workspace.write().await = Some(workspace.clone());
        info!("[Client] ✅ 工作区已就绪，userID: {}", session.user_id);
        Ok(workspace)
    }

    /// 当前登录用户的工作区
    pub async fn workspace(&self) -> Result<Arc<Workspace>, AuthError> {
        self.workspace
            .read()
            .await
            .clone()
            .ok_or(AuthError::NotSignedIn)
    }

    pub async fn sync_all(&self) -> Result<()> {
        self.workspace().await?.sync_all().await
    }

    /// 按配置的间隔启动轮询同步
    pub async fn start_polling(&self) -> Result<Vec<ListenerRegistration>> {
        let ws = self.workspace().await?;
        Ok(ws.start_polling(self.config.poll_interval()))
    }

    /// 建立实时连接并订阅公告、任务与当前用户的会话
    pub async fn connect_realtime(&self) -> Result<()> {
        let ws = self.workspace().await?;
        let session = self
            .auth
            .current_session()
            .await
            .ok_or(AuthError::NotSignedIn)?;
        let connection = RealtimeConnection::connect(
            &self.config,
            &session.id_token,
            Arc::new(SnapshotRouter::new(ws.clone())),
        )
        .await?;

        let handle = connection.handle();
        handle.listen(Collection::Announcements, None).await?;
        handle.listen(Collection::Missions, None).await?;
        handle
            .listen(Collection::Conversations, Some(ws.user_id.clone()))
            .await?;

        // 替换旧连接，旧连接 drop 时停止任务
        *self.realtime.lock().await = Some(connection);
        Ok(())
    }

    pub async fn disconnect_realtime(&self) {
        let connection = self.realtime.lock().await.take();
        if let Some(connection) = connection {
            connection.close().await;
            info!("[Client] 实时连接已关闭");
        }
    }

    pub async fn is_realtime_connected(&self) -> bool {
        match self.realtime.lock().await.as_ref() {
            Some(connection) => connection.is_connected(),
            None => false,
        }
    }

    /// 打开会话页面：同步消息、订阅实时消息、标记已读。
    /// 返回的注册句柄 drop 时取消订阅。
    pub async fn open_conversation(&self, conversation_id: &str) -> Result<ListenerRegistration> {
        let ws = self.workspace().await?;
        if let Err(e) = ws.messages.sync(conversation_id).await {
            warn!("[Client] 同步会话 {} 消息失败: {:#}", conversation_id, e);
        }

        let handle = match self.realtime.lock().await.as_ref() {
            Some(connection) => Some(connection.handle()),
            None => None,
        };
        if let Some(handle) = &handle {
            handle
                .listen(Collection::Messages, Some(conversation_id.to_string()))
                .await
                .context("订阅会话消息失败")?;
        }

        ws.dispatcher
            .set_active_conversation(Some(conversation_id.to_string()))
            .await;
        if let Err(e) = ws.conversations.mark_as_read(conversation_id, &ws.user_id).await {
            warn!("[Client] 标记会话 {} 已读失败: {:#}", conversation_id, e);
        }

        let id = conversation_id.to_string();
        Ok(ListenerRegistration::from_cleanup(
            format!("conversation:{}", conversation_id),
            move || {
                let Ok(runtime) = tokio::runtime::Handle::try_current() else {
                    return;
                };
                runtime.spawn(async move {
                    if let Some(handle) = handle {
                        if let Err(e) = handle.unlisten(Collection::Messages, Some(id.clone())).await {
                            warn!("[Client] 取消订阅会话 {} 失败: {:#}", id, e);
                        }
                    }
                    ws.dispatcher.leave_conversation(&id).await;
                    ws.messages.release_view(&id).await;
                });
            },
        ))
    }

    pub async fn send_message(&self, conversation_id: &str, content: &str) -> Result<Message> {
        self.workspace()
            .await?
            .send_message(conversation_id, content)
            .await
    }

    /// 上报设备推送令牌
    pub async fn register_push_token(&self, token: &str) -> Result<bool> {
        let ws = self.workspace().await?;
        ws.push
            .update_token(&ws.user_id, token, &self.config.platform)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::testing::init_test_logger;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(server: &MockServer) -> ClientConfig {
        init_test_logger();
        let mut config = ClientConfig::new(server.uri());
        config.db_url = "sqlite::memory:".to_string();
        config.db_max_connections = 1;
        config
    }

    async fn mount(server: &MockServer, route: &str, data: serde_json::Value) {
        Mock::given(method("POST"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "errCode": 0, "errMsg": "", "data": data
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn workspace_requires_login() {
        let server = MockServer::start().await;
        let client = SchoolHubClient::new(test_config(&server)).await.unwrap();
        assert!(matches!(client.workspace().await, Err(AuthError::NotSignedIn)));
        assert!(client.sync_all().await.is_err());
        assert!(!client.is_realtime_connected().await);
    }

    #[tokio::test]
    async fn login_then_sync_over_http() {
        let server = MockServer::start().await;
        mount(
            &server,
            "/auth/sign_in",
            json!({"userID": "u1", "email": "ana@school.test", "idToken": "tok", "refreshToken": "r"}),
        )
        .await;
        mount(
            &server,
            "/user/get_user",
            json!({"user": {"id": "u1", "email": "ana@school.test", "firstName": "Ana"}}),
        )
        .await;
        mount(
            &server,
            "/announcement/get_all",
            json!({"announcements": [{"id": "a1", "authorID": "t1", "title": "运动会", "content": "周五"}]}),
        )
        .await;
        mount(&server, "/mission/get_all", json!({"missions": []})).await;
        mount(
            &server,
            "/conversation/get_all_conversations",
            json!({"conversations": [{"id": "c1", "participantIDs": ["u1", "u2"]}]}),
        )
        .await;

        let client = SchoolHubClient::new(test_config(&server)).await.unwrap();
        let user = client.login("ana@school.test", "secret123").await.unwrap();
        assert_eq!(user.id, "u1");

        client.sync_all().await.unwrap();
        let ws = client.workspace().await.unwrap();
        assert_eq!(ws.announcements.list().await.unwrap().len(), 1);
        assert_eq!(ws.conversations.list().await.unwrap().len(), 1);

        // 认证后的请求都带 Bearer token
        let requests = server.received_requests().await.unwrap();
        let authed = requests
            .iter()
            .filter(|r| r.url.path() == "/announcement/get_all")
            .all(|r| {
                r.headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    == Some("Bearer tok")
            });
        assert!(authed);
    }

    #[tokio::test]
    async fn logout_clears_workspace() {
        let server = MockServer::start().await;
        mount(
            &server,
            "/auth/sign_in",
            json!({"userID": "u1", "email": "ana@school.test", "idToken": "tok"}),
        )
        .await;
        mount(
            &server,
            "/user/get_user",
            json!({"user": {"id": "u1", "email": "ana@school.test"}}),
        )
        .await;
        mount(&server, "/auth/sign_out", json!(null)).await;

        let client = SchoolHubClient::new(test_config(&server)).await.unwrap();
        client.login("ana@school.test", "secret123").await.unwrap();
        assert!(client.workspace().await.is_ok());

        client.logout().await.unwrap();
        assert!(client.workspace().await.is_err());
        assert!(client.restore_session().await.unwrap().is_none());
    }
}
