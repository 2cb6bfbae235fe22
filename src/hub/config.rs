//! 客户端配置
//!
//! 默认值来自 [`ClientConfig::new`]，可被 `config/schoolhub.*` 配置文件与
//! `SCHOOLHUB_*` 环境变量覆盖（启动时先加载 `.env`）。

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 客户端配置
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    /// HTTP API 基础地址
    pub api_base_url: String,
    /// 实时监听 WebSocket 地址
    pub ws_url: String,
    /// 本地 SQLite 数据库 URL，例如 `sqlite://schoolhub.db?mode=rwc`
    pub db_url: String,
    /// 连接池大小
    pub db_max_connections: u32,
    /// 实时帧压缩方式："gzip" 或空字符串表示不压缩
    pub compression: String,
    /// 单次请求超时（秒）
    pub request_timeout_secs: u64,
    /// 轮询同步间隔（秒）
    pub poll_interval_secs: u64,
    /// WebSocket 心跳间隔（秒）
    pub heartbeat_secs: u64,
    /// 设备平台，例如 "ios" / "android"
    pub platform: String,
}

impl ClientConfig {
    /// 创建默认配置
    pub fn new(api_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            ws_url: "ws://localhost:10001/realtime".to_string(),
            db_url: "sqlite://schoolhub.db?mode=rwc".to_string(),
            db_max_connections: 5,
            compression: "gzip".to_string(),
            request_timeout_secs: 15,
            poll_interval_secs: 60,
            heartbeat_secs: 25,
            platform: "ios".to_string(),
        }
    }

    /// 从配置文件与环境变量加载
    pub fn load() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::load_from(environment())
    }

    fn load_from(env: Environment) -> Result<Self, ConfigError> {
        let defaults = Self::new("http://localhost:10002");
        Config::builder()
            .set_default("api_base_url", defaults.api_base_url)?
            .set_default("ws_url", defaults.ws_url)?
            .set_default("db_url", defaults.db_url)?
            .set_default("db_max_connections", defaults.db_max_connections as i64)?
            .set_default("compression", defaults.compression)?
            .set_default("request_timeout_secs", defaults.request_timeout_secs as i64)?
            .set_default("poll_interval_secs", defaults.poll_interval_secs as i64)?
            .set_default("heartbeat_secs", defaults.heartbeat_secs as i64)?
            .set_default("platform", defaults.platform)?
            .add_source(File::with_name("config/schoolhub").required(false))
            .add_source(env)
            .build()?
            .try_deserialize()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs.max(1))
    }

    pub fn gzip_enabled(&self) -> bool {
        self.compression.eq_ignore_ascii_case("gzip")
    }
}

/// `SCHOOLHUB_*` 环境变量来源，数字与布尔值按类型解析
fn environment() -> Environment {
    Environment::with_prefix("SCHOOLHUB").try_parsing(true)
}
