//! 推送通知模块：推送令牌上报与本地通知分发

pub mod api;
pub mod dao;
pub mod dispatcher;
pub mod models;
pub mod service;

pub use api::{PushTokenApi, PushTokenRemote};
pub use dao::PushTokenDao;
pub use dispatcher::{LocalNotification, LogPresenter, NotificationDispatcher, NotificationPresenter};
pub use models::PushToken;
pub use service::PushTokenService;
