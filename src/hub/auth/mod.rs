//! 认证模块
//!
//! 登录、注册、会话持久化与身份服务错误映射

pub mod api;
pub mod dao;
pub mod models;
pub mod service;

pub use api::{AuthApi, IdentityProvider};
pub use dao::SessionDao;
pub use models::{AuthSession, RegisterRequest};
pub use service::AuthService;
