//! 测试辅助：样例数据与各远端接口的内存实现

use crate::hub::announcement::{Announcement, AnnouncementListener, AnnouncementRemote};
use crate::hub::auth::{AuthSession, IdentityProvider};
use crate::hub::conversation::{Conversation, ConversationRemote};
use crate::hub::error::{ApiError, AuthError};
use crate::hub::message::{Message, MessageListener, MessageRemote};
use crate::hub::mission::{Mission, MissionRemote};
use crate::hub::notification::{LocalNotification, NotificationPresenter, PushToken, PushTokenRemote};
use crate::hub::types::{SendState, SyncState};
use crate::hub::user::{User, UserRemote, UserRole};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Mutex, Once};

static INIT_LOGGER: Once = Once::new();

/// 测试日志：只保留本 crate 与 sqlx 的 debug 输出
pub fn init_test_logger() {
    INIT_LOGGER.call_once(|| {
        use tracing_subscriber::prelude::*;
        use tracing_subscriber::EnvFilter;

        let filter_layer = EnvFilter::new("info,schoolhub_sdk_core=debug,sqlx=info");
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_file(true)
            .with_line_number(true)
            .with_target(false)
            .with_test_writer();

        let _ = tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt_layer)
            .try_init();
    });
}

pub fn sample_user(id: &str) -> User {
    User {
        id: id.to_string(),
        email: format!("{}@school.test", id),
        first_name: "Ana".to_string(),
        last_name: "Lopez".to_string(),
        role: UserRole::Student,
        school_class: "3B".to_string(),
        avatar_url: None,
        created_at: 1,
        updated_at: 1,
    }
}

pub fn sample_announcement(id: &str, created_at: i64) -> Announcement {
    Announcement {
        id: id.to_string(),
        author_id: "t1".to_string(),
        title: format!("公告 {}", id),
        content: "请同学们注意".to_string(),
        image_url: None,
        created_at,
        updated_at: created_at,
        state: SyncState::Published,
    }
}

pub fn sample_mission(id: &str, starts_at: i64) -> Mission {
    Mission {
        id: id.to_string(),
        author_id: "t1".to_string(),
        title: format!("任务 {}", id),
        description: "志愿活动".to_string(),
        location: "学校操场".to_string(),
        starts_at,
        ends_at: None,
        capacity: None,
        participant_ids: Vec::new(),
        created_at: 1,
        updated_at: 1,
        state: SyncState::Published,
    }
}

pub fn sample_message(conversation_id: &str, id: &str, sender_id: &str, sent_at: i64) -> Message {
    Message {
        id: id.to_string(),
        conversation_id: conversation_id.to_string(),
        sender_id: sender_id.to_string(),
        content: format!("消息 {}", id),
        sent_at,
        state: SendState::Sent,
    }
}

pub fn sample_conversation(id: &str, participants: &[&str], created_at: i64) -> Conversation {
    Conversation {
        id: id.to_string(),
        participant_ids: participants.iter().map(|p| p.to_string()).collect(),
        title: String::new(),
        last_message: String::new(),
        last_message_at: 0,
        unread_count: 0,
        created_at,
        updated_at: created_at,
    }
}

fn check(failure: &Mutex<Option<ApiError>>) -> Result<()> {
    match failure.lock().unwrap().clone() {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

fn not_found(what: &str) -> anyhow::Error {
    ApiError::Business {
        code: 1004,
        message: format!("{} not found", what),
    }
    .into()
}

// ========== 用户 ==========

#[derive(Default)]
pub struct MockUserRemote {
    users: Mutex<HashMap<String, User>>,
    allowed: Mutex<HashSet<String>>,
    failure: Mutex<Option<ApiError>>,
    get_user_calls: AtomicUsize,
}

impl MockUserRemote {
    pub fn insert(&self, user: User) {
        self.users.lock().unwrap().insert(user.id.clone(), user);
    }

    pub fn remove(&self, id: &str) {
        self.users.lock().unwrap().remove(id);
    }

    pub fn get(&self, id: &str) -> Option<User> {
        self.users.lock().unwrap().get(id).cloned()
    }

    pub fn allow_email(&self, email: &str) {
        self.allowed.lock().unwrap().insert(email.to_string());
    }

    pub fn fail_with(&self, error: ApiError) {
        *self.failure.lock().unwrap() = Some(error);
    }

    pub fn get_user_calls(&self) -> usize {
        self.get_user_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UserRemote for MockUserRemote {
    async fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        self.get_user_calls.fetch_add(1, Ordering::SeqCst);
        check(&self.failure)?;
        Ok(self.get(user_id))
    }

    async fn get_users(&self, user_ids: &[String]) -> Result<Vec<User>> {
        check(&self.failure)?;
        Ok(user_ids.iter().filter_map(|id| self.get(id)).collect())
    }

    async fn create_user(&self, user: &User) -> Result<User> {
        check(&self.failure)?;
        self.insert(user.clone());
        Ok(user.clone())
    }

    async fn update_user(&self, user: &User) -> Result<User> {
        check(&self.failure)?;
        if self.get(&user.id).is_none() {
            return Err(not_found("user"));
        }
        self.insert(user.clone());
        Ok(user.clone())
    }

    async fn delete_user(&self, user_id: &str) -> Result<()> {
        check(&self.failure)?;
        self.remove(user_id);
        Ok(())
    }

    async fn is_email_allowed(&self, email: &str) -> Result<bool> {
        check(&self.failure)?;
        Ok(self.allowed.lock().unwrap().contains(email))
    }
}

// ========== 身份服务 ==========

#[derive(Default)]
pub struct MockIdentityProvider {
    /// email -> (password, uid)
    accounts: Mutex<HashMap<String, (String, String)>>,
    expire_immediately: AtomicBool,
    sign_out_calls: AtomicUsize,
    sign_up_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
}

impl MockIdentityProvider {
    pub fn add_account(&self, email: &str, password: &str, uid: &str) {
        self.accounts
            .lock()
            .unwrap()
            .insert(email.to_string(), (password.to_string(), uid.to_string()));
    }

    /// 之后签发的会话立即过期（用于测试刷新）
    pub fn expire_sessions_immediately(&self) {
        self.expire_immediately.store(true, Ordering::SeqCst);
    }

    pub fn sign_out_calls(&self) -> usize {
        self.sign_out_calls.load(Ordering::SeqCst)
    }

    pub fn sign_up_calls(&self) -> usize {
        self.sign_up_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    fn session(&self, email: &str, uid: &str, expires_at: i64) -> AuthSession {
        AuthSession {
            user_id: uid.to_string(),
            email: email.to_string(),
            id_token: format!("token-{}", uid),
            refresh_token: format!("refresh-{}", uid),
            expires_at,
        }
    }

    fn issue(&self, email: &str, uid: &str) -> AuthSession {
        let expires_at = if self.expire_immediately.load(Ordering::SeqCst) {
            1
        } else {
            0
        };
        self.session(email, uid, expires_at)
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, AuthError> {
        let account = self.accounts.lock().unwrap().get(email).cloned();
        match account {
            None => Err(AuthError::UserNotFound),
            Some((stored, _)) if stored != password => Err(AuthError::InvalidCredentials),
            Some((_, uid)) => Ok(self.issue(email, &uid)),
        }
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthSession, AuthError> {
        self.sign_up_calls.fetch_add(1, Ordering::SeqCst);
        if self.accounts.lock().unwrap().contains_key(email) {
            return Err(AuthError::EmailAlreadyInUse);
        }
        let uid = format!("uid-{}", self.sign_up_calls());
        self.add_account(email, password, &uid);
        Ok(self.issue(email, &uid))
    }

    async fn sign_out(&self, _session: &AuthSession) -> Result<(), AuthError> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn refresh(&self, refresh_token: &str) -> Result<AuthSession, AuthError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        let uid = refresh_token
            .strip_prefix("refresh-")
            .ok_or(AuthError::InvalidCredentials)?;
        let email = self
            .accounts
            .lock()
            .unwrap()
            .iter()
            .find(|(_, (_, id))| id == uid)
            .map(|(email, _)| email.clone())
            .ok_or(AuthError::UserNotFound)?;
        Ok(self.session(&email, uid, 0))
    }

    async fn send_password_reset(&self, email: &str) -> Result<(), AuthError> {
        if self.accounts.lock().unwrap().contains_key(email) {
            Ok(())
        } else {
            Err(AuthError::UserNotFound)
        }
    }

    async fn delete_account(&self, session: &AuthSession) -> Result<(), AuthError> {
        self.accounts.lock().unwrap().remove(&session.email);
        Ok(())
    }
}

// ========== 公告 ==========

#[derive(Default)]
pub struct MockAnnouncementRemote {
    items: Mutex<Vec<Announcement>>,
    fetch_failure: Mutex<Option<ApiError>>,
    create_failure: Mutex<Option<ApiError>>,
    update_failure: Mutex<Option<ApiError>>,
    delete_failure: Mutex<Option<ApiError>>,
    created: Mutex<Vec<String>>,
    updated: Mutex<Vec<String>>,
}

impl MockAnnouncementRemote {
    pub fn set(&self, items: Vec<Announcement>) {
        *self.items.lock().unwrap() = items;
    }

    pub fn fail_fetches(&self, error: ApiError) {
        *self.fetch_failure.lock().unwrap() = Some(error);
    }

    pub fn fail_creates(&self, error: ApiError) {
        *self.create_failure.lock().unwrap() = Some(error);
    }

    pub fn allow_creates(&self) {
        *self.create_failure.lock().unwrap() = None;
    }

    pub fn fail_updates(&self, error: ApiError) {
        *self.update_failure.lock().unwrap() = Some(error);
    }

    pub fn allow_updates(&self) {
        *self.update_failure.lock().unwrap() = None;
    }

    pub fn fail_deletes(&self, error: ApiError) {
        *self.delete_failure.lock().unwrap() = Some(error);
    }

    pub fn created_ids(&self) -> Vec<String> {
        self.created.lock().unwrap().clone()
    }

    pub fn updated_ids(&self) -> Vec<String> {
        self.updated.lock().unwrap().clone()
    }
}

#[async_trait]
impl AnnouncementRemote for MockAnnouncementRemote {
    async fn fetch_all(&self) -> Result<Vec<Announcement>> {
        check(&self.fetch_failure)?;
        Ok(self.items.lock().unwrap().clone())
    }

    async fn create(&self, announcement: &Announcement) -> Result<Announcement> {
        check(&self.create_failure)?;
        let saved = Announcement {
            state: SyncState::Published,
            ..announcement.clone()
        };
        self.created.lock().unwrap().push(saved.id.clone());
        self.items.lock().unwrap().push(saved.clone());
        Ok(saved)
    }

    async fn update(&self, announcement: &Announcement) -> Result<Announcement> {
        check(&self.update_failure)?;
        self.updated.lock().unwrap().push(announcement.id.clone());
        let mut items = self.items.lock().unwrap();
        let slot = items
            .iter_mut()
            .find(|a| a.id == announcement.id)
            .ok_or_else(|| not_found("announcement"))?;
        *slot = announcement.clone();
        Ok(announcement.clone())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        check(&self.delete_failure)?;
        self.items.lock().unwrap().retain(|a| a.id != id);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingAnnouncementListener {
    changed: Mutex<Vec<String>>,
    deleted: Mutex<Vec<String>>,
    failures: AtomicUsize,
}

impl RecordingAnnouncementListener {
    pub fn changed(&self) -> Vec<String> {
        self.changed.lock().unwrap().clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnnouncementListener for RecordingAnnouncementListener {
    async fn on_announcements_changed(&self, announcements: Vec<Announcement>) {
        self.changed
            .lock()
            .unwrap()
            .extend(announcements.into_iter().map(|a| a.id));
    }

    async fn on_announcements_deleted(&self, ids: Vec<String>) {
        self.deleted.lock().unwrap().extend(ids);
    }

    async fn on_sync_failed(&self, _reason: String) {
        self.failures.fetch_add(1, Ordering::SeqCst);
    }
}

// ========== 任务 ==========

#[derive(Default)]
pub struct MockMissionRemote {
    items: Mutex<Vec<Mission>>,
    write_failure: Mutex<Option<ApiError>>,
    created: Mutex<Vec<String>>,
    deleted: Mutex<Vec<String>>,
    join_calls: AtomicUsize,
}

impl MockMissionRemote {
    pub fn set(&self, items: Vec<Mission>) {
        *self.items.lock().unwrap() = items;
    }

    pub fn fail_writes(&self, error: ApiError) {
        *self.write_failure.lock().unwrap() = Some(error);
    }

    pub fn allow_writes(&self) {
        *self.write_failure.lock().unwrap() = None;
    }

    pub fn created_ids(&self) -> Vec<String> {
        self.created.lock().unwrap().clone()
    }

    pub fn deleted_ids(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn remote_mission(&self, id: &str) -> Option<Mission> {
        self.items.lock().unwrap().iter().find(|m| m.id == id).cloned()
    }

    pub fn join_calls(&self) -> usize {
        self.join_calls.load(Ordering::SeqCst)
    }

    fn modify(&self, id: &str, f: impl FnOnce(&mut Mission)) -> Result<Mission> {
        let mut items = self.items.lock().unwrap();
        let mission = items
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| not_found("mission"))?;
        f(mission);
        Ok(mission.clone())
    }
}

#[async_trait]
impl MissionRemote for MockMissionRemote {
    async fn fetch_all(&self) -> Result<Vec<Mission>> {
        Ok(self.items.lock().unwrap().clone())
    }

    async fn create(&self, mission: &Mission) -> Result<Mission> {
        check(&self.write_failure)?;
        let saved = Mission {
            state: SyncState::Published,
            ..mission.clone()
        };
        self.created.lock().unwrap().push(saved.id.clone());
        self.items.lock().unwrap().push(saved.clone());
        Ok(saved)
    }

    async fn update(&self, mission: &Mission) -> Result<Mission> {
        check(&self.write_failure)?;
        let updated = mission.clone();
        self.modify(&mission.id, |m| *m = updated)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        check(&self.write_failure)?;
        self.deleted.lock().unwrap().push(id.to_string());
        self.items.lock().unwrap().retain(|m| m.id != id);
        Ok(())
    }

    async fn join(&self, mission_id: &str, user_id: &str) -> Result<Mission> {
        self.join_calls.fetch_add(1, Ordering::SeqCst);
        check(&self.write_failure)?;
        self.modify(mission_id, |m| {
            if !m.participant_ids.iter().any(|p| p == user_id) {
                m.participant_ids.push(user_id.to_string());
            }
        })
    }

    async fn leave(&self, mission_id: &str, user_id: &str) -> Result<Mission> {
        check(&self.write_failure)?;
        self.modify(mission_id, |m| m.participant_ids.retain(|p| p != user_id))
    }
}

// ========== 会话 ==========

#[derive(Default)]
pub struct MockConversationRemote {
    items: Mutex<Vec<Conversation>>,
    fetch_failure: Mutex<Option<ApiError>>,
    write_failure: Mutex<Option<ApiError>>,
    created: Mutex<Vec<String>>,
    mark_read: Mutex<Vec<String>>,
}

impl MockConversationRemote {
    pub fn set(&self, items: Vec<Conversation>) {
        *self.items.lock().unwrap() = items;
    }

    pub fn fail_fetches(&self, error: ApiError) {
        *self.fetch_failure.lock().unwrap() = Some(error);
    }

    pub fn fail_writes(&self, error: ApiError) {
        *self.write_failure.lock().unwrap() = Some(error);
    }

    pub fn created_ids(&self) -> Vec<String> {
        self.created.lock().unwrap().clone()
    }

    pub fn mark_read_calls(&self) -> Vec<String> {
        self.mark_read.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConversationRemote for MockConversationRemote {
    async fn fetch_for_user(&self, _user_id: &str) -> Result<Vec<Conversation>> {
        check(&self.fetch_failure)?;
        Ok(self.items.lock().unwrap().clone())
    }

    async fn create(&self, conversation: &Conversation) -> Result<Conversation> {
        check(&self.write_failure)?;
        self.created.lock().unwrap().push(conversation.id.clone());
        self.items.lock().unwrap().push(conversation.clone());
        Ok(conversation.clone())
    }

    async fn delete(&self, conversation_id: &str) -> Result<()> {
        check(&self.write_failure)?;
        self.items.lock().unwrap().retain(|c| c.id != conversation_id);
        Ok(())
    }

    async fn mark_read(&self, conversation_id: &str, _user_id: &str) -> Result<()> {
        check(&self.write_failure)?;
        self.mark_read.lock().unwrap().push(conversation_id.to_string());
        Ok(())
    }
}

// ========== 消息 ==========

#[derive(Default)]
pub struct MockMessageRemote {
    messages: Mutex<HashMap<String, Vec<Message>>>,
    fetch_failure: Mutex<Option<ApiError>>,
    fetch_calls: AtomicUsize,
    send_failure: Mutex<Option<ApiError>>,
    sent: Mutex<Vec<String>>,
    delete_calls: AtomicUsize,
}

impl MockMessageRemote {
    pub fn set_messages(&self, conversation_id: &str, messages: Vec<Message>) {
        self.messages
            .lock()
            .unwrap()
            .insert(conversation_id.to_string(), messages);
    }

    pub fn fail_fetches(&self, error: ApiError) {
        *self.fetch_failure.lock().unwrap() = Some(error);
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn fail_sends(&self, error: ApiError) {
        *self.send_failure.lock().unwrap() = Some(error);
    }

    pub fn allow_sends(&self) {
        *self.send_failure.lock().unwrap() = None;
    }

    pub fn sent_ids(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageRemote for MockMessageRemote {
    async fn fetch_messages(&self, conversation_id: &str) -> Result<Vec<Message>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        check(&self.fetch_failure)?;
        Ok(self
            .messages
            .lock()
            .unwrap()
            .get(conversation_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn send(&self, message: &Message) -> Result<Message> {
        check(&self.send_failure)?;
        let saved = Message {
            state: SendState::Sent,
            ..message.clone()
        };
        self.sent.lock().unwrap().push(saved.id.clone());
        self.messages
            .lock()
            .unwrap()
            .entry(saved.conversation_id.clone())
            .or_default()
            .push(saved.clone());
        Ok(saved)
    }

    async fn delete(&self, conversation_id: &str, message_id: &str) -> Result<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(list) = self.messages.lock().unwrap().get_mut(conversation_id) {
            list.retain(|m| m.id != message_id);
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingMessageListener {
    deleted: Mutex<Vec<String>>,
    fresh: Mutex<Vec<String>>,
    failures: Mutex<Vec<String>>,
}

impl RecordingMessageListener {
    pub fn deleted_ids(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn new_message_ids(&self) -> Vec<String> {
        self.fresh.lock().unwrap().clone()
    }

    /// 同步失败的会话 id
    pub fn failed_conversations(&self) -> Vec<String> {
        self.failures.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageListener for RecordingMessageListener {
    async fn on_messages_changed(&self, _conversation_id: String, _messages: Vec<Message>) {}

    async fn on_messages_deleted(&self, _conversation_id: String, ids: Vec<String>) {
        self.deleted.lock().unwrap().extend(ids);
    }

    async fn on_new_messages(&self, messages: Vec<Message>) {
        self.fresh
            .lock()
            .unwrap()
            .extend(messages.into_iter().map(|m| m.id));
    }

    async fn on_sync_failed(&self, conversation_id: String, _reason: String) {
        self.failures.lock().unwrap().push(conversation_id);
    }
}

// ========== 推送 ==========

#[derive(Default)]
pub struct MockPushTokenRemote {
    registered: Mutex<Vec<String>>,
    failure: Mutex<Option<ApiError>>,
}

impl MockPushTokenRemote {
    pub fn registered(&self) -> Vec<String> {
        self.registered.lock().unwrap().clone()
    }

    pub fn fail_with(&self, error: ApiError) {
        *self.failure.lock().unwrap() = Some(error);
    }

    pub fn recover(&self) {
        *self.failure.lock().unwrap() = None;
    }
}

#[async_trait]
impl PushTokenRemote for MockPushTokenRemote {
    async fn register(&self, token: &PushToken) -> Result<()> {
        check(&self.failure)?;
        self.registered.lock().unwrap().push(token.token.clone());
        Ok(())
    }

    async fn unregister(&self, _user_id: &str, token: &str) -> Result<()> {
        check(&self.failure)?;
        self.registered.lock().unwrap().retain(|t| t != token);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingPresenter {
    presented: Mutex<Vec<LocalNotification>>,
    badge: AtomicU32,
}

impl RecordingPresenter {
    pub fn presented(&self) -> Vec<LocalNotification> {
        self.presented.lock().unwrap().clone()
    }

    pub fn badge(&self) -> u32 {
        self.badge.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NotificationPresenter for RecordingPresenter {
    async fn present(&self, notification: LocalNotification) {
        self.presented.lock().unwrap().push(notification);
    }

    async fn set_badge(&self, count: u32) {
        self.badge.store(count, Ordering::SeqCst);
    }
}
