//! 用户模块
//!
//! 用户资料的本地缓存、远端读写与资料管理

pub mod api;
pub mod dao;
pub mod models;
pub mod service;

pub use api::{UserApi, UserRemote};
pub use dao::UserDao;
pub use models::{User, UserRole};
pub use service::UserRepository;
