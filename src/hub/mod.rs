pub mod announcement;
pub mod auth;
pub mod client;
pub mod config;
pub mod conversation;
pub mod db;
pub mod error;
pub mod http;
pub mod message;
pub mod mission;
pub mod notification;
pub mod realtime;
pub mod reconcile;
pub mod registration;
pub mod serialization;
pub mod timeout;
pub mod types;
pub mod user;
pub mod workspace;

#[cfg(test)]
mod testing;

// 重新导出客户端入口
pub use client::SchoolHubClient;
pub use config::ClientConfig;
pub use workspace::{Listeners, Workspace};
