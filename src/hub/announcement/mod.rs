//! 公告模块
//!
//! 公告的本地缓存、远端同步与发布流程

pub mod api;
pub mod dao;
pub mod listener;
pub mod models;
pub mod service;

pub use api::{AnnouncementApi, AnnouncementRemote};
pub use dao::AnnouncementDao;
pub use listener::{AnnouncementListener, EmptyAnnouncementListener};
pub use models::Announcement;
pub use service::AnnouncementRepository;
