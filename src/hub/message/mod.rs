//! 消息模块：单个会话内的消息同步与发送

pub mod api;
pub mod dao;
pub mod listener;
pub mod models;
pub mod service;

pub use api::{MessageApi, MessageRemote};
pub use dao::MessageDao;
pub use listener::{EmptyMessageListener, MessageListener};
pub use models::Message;
pub use service::MessageRepository;
