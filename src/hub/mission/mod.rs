//! 任务（志愿活动）模块

pub mod api;
pub mod dao;
pub mod listener;
pub mod models;
pub mod service;

pub use api::{MissionApi, MissionRemote};
pub use dao::MissionDao;
pub use listener::{EmptyMissionListener, MissionListener};
pub use models::{Mission, MissionDraft};
pub use service::MissionRepository;
