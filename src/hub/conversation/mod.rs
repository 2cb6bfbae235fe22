//! 会话模块：会话列表同步、未读数与最新消息维护

pub mod api;
pub mod dao;
pub mod listener;
pub mod models;
pub mod service;

pub use api::{ConversationApi, ConversationRemote};
pub use dao::ConversationDao;
pub use listener::{ConversationListener, EmptyConversationListener};
pub use models::Conversation;
pub use service::ConversationRepository;
