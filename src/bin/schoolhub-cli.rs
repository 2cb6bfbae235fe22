//! SchoolHub CLI 客户端
//!
//! 非交互式 CLI，用于联调同步流程：登录后可拉取公告、任务、会话，
//! 发送消息，或保持实时连接并输出收到的所有变更。

use anyhow::{bail, Result};
use chrono::{Local, TimeZone};
use clap::{Parser, Subcommand};
use schoolhub_sdk_core::hub::announcement::AnnouncementListener;
use schoolhub_sdk_core::hub::conversation::ConversationListener;
use schoolhub_sdk_core::hub::message::MessageListener;
use schoolhub_sdk_core::hub::mission::MissionListener;
use schoolhub_sdk_core::hub::notification::LogPresenter;
use schoolhub_sdk_core::hub::types::now_millis;
use schoolhub_sdk_core::{
    Announcement, ClientConfig, Conversation, Listeners, Message, Mission, SchoolHubClient,
};
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};

/// SchoolHub CLI 客户端
#[derive(Parser, Debug)]
#[command(name = "schoolhub-cli")]
#[command(about = "SchoolHub CLI 客户端 - 用于联调数据同步", long_about = None)]
struct Args {
    /// 日志级别（默认: info,schoolhub_sdk_core=debug）
    #[arg(long, default_value = "info,schoolhub_sdk_core=debug")]
    log_level: String,

    /// 覆盖配置中的 API 地址
    #[arg(long)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 登录并保存会话
    Login {
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        password: String,
    },
    /// 退出登录并清空本地缓存
    Logout,
    /// 同步所有数据
    Sync,
    /// 列出本地公告
    Announcements,
    /// 列出未结束的任务
    Missions,
    /// 列出会话
    Conversations,
    /// 发送一条文本消息
    Send {
        #[arg(short, long)]
        conversation: String,
        text: String,
    },
    /// 保持实时连接并输出收到的变更
    Watch {
        /// 同时打开某个会话
        #[arg(short, long)]
        conversation: Option<String>,
        /// 运行时长（秒），0 表示持续运行
        #[arg(short, long, default_value = "0")]
        duration: u64,
    },
}

/// 初始化日志（同时输出到 stdout 和文件）
fn init_logger(log_level: &str) -> Result<()> {
    use std::fs::OpenOptions;
    use std::io;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    // 优先使用环境变量 RUST_LOG
    let filter_layer =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open("schoolhub.log")?;

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .with_target(false)
        .with_ansi(true);

    // 文件不需要颜色
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(stdout_layer)
        .with(file_layer)
        .init();
    Ok(())
}

fn format_time(millis: i64) -> String {
    match Local.timestamp_millis_opt(millis).single() {
        Some(t) if millis > 0 => t.format("%Y-%m-%d %H:%M").to_string(),
        _ => "-".to_string(),
    }
}

/// 输出所有变更的监听器
struct CliListener;

#[async_trait::async_trait]
impl AnnouncementListener for CliListener {
    async fn on_announcements_changed(&self, announcements: Vec<Announcement>) {
        for a in announcements {
            info!("[CLI/Announcement] 📰 {} | {}", a.id, a.title);
        }
    }

    async fn on_announcements_deleted(&self, ids: Vec<String>) {
        info!("[CLI/Announcement] 🗑️ 删除: {:?}", ids);
    }

    async fn on_sync_failed(&self, reason: String) {
        error!("[CLI/Announcement] ❌ 同步失败: {}", reason);
    }
}

#[async_trait::async_trait]
impl MissionListener for CliListener {
    async fn on_missions_changed(&self, missions: Vec<Mission>) {
        for m in missions {
            info!(
                "[CLI/Mission] 📌 {} | {} | 参与 {}",
                m.id,
                m.title,
                m.participant_ids.len()
            );
        }
    }

    async fn on_missions_deleted(&self, ids: Vec<String>) {
        info!("[CLI/Mission] 🗑️ 删除: {:?}", ids);
    }

    async fn on_sync_failed(&self, reason: String) {
        error!("[CLI/Mission] ❌ 同步失败: {}", reason);
    }
}

#[async_trait::async_trait]
impl ConversationListener for CliListener {
    async fn on_conversations_changed(&self, conversations: Vec<Conversation>) {
        for c in conversations {
            info!(
                "[CLI/Conversation] 🔄 {} | 未读: {} | {}",
                c.id, c.unread_count, c.last_message
            );
        }
    }

    async fn on_conversations_deleted(&self, ids: Vec<String>) {
        info!("[CLI/Conversation] 🗑️ 删除: {:?}", ids);
    }

    async fn on_total_unread_changed(&self, total: u32) {
        info!("[CLI/Conversation] 📬 总未读数: {}", total);
    }

    async fn on_sync_failed(&self, reason: String) {
        error!("[CLI/Conversation] ❌ 同步失败: {}", reason);
    }
}

#[async_trait::async_trait]
impl MessageListener for CliListener {
    async fn on_messages_changed(&self, conversation_id: String, messages: Vec<Message>) {
        info!(
            "[CLI/Message] 💬 会话 {} 共 {} 条消息",
            conversation_id,
            messages.len()
        );
    }

    async fn on_messages_deleted(&self, conversation_id: String, ids: Vec<String>) {
        info!("[CLI/Message] 🗑️ 会话 {} 删除: {:?}", conversation_id, ids);
    }

    async fn on_new_messages(&self, messages: Vec<Message>) {
        for m in messages {
            info!("[CLI/Message] 📨 {}: {}", m.sender_id, m.preview());
        }
    }

    async fn on_sync_failed(&self, conversation_id: String, reason: String) {
        error!("[CLI/Message] ❌ 会话 {} 同步失败: {}", conversation_id, reason);
    }
}

fn cli_listeners() -> Listeners {
    let listener = Arc::new(CliListener);
    Listeners {
        announcements: listener.clone(),
        missions: listener.clone(),
        conversations: listener.clone(),
        messages: listener,
        presenter: Arc::new(LogPresenter),
    }
}

/// 恢复本地会话；没有会话时提示先登录
async fn require_session(client: &SchoolHubClient) -> Result<()> {
    match client.restore_session().await? {
        Some(user) => {
            info!("[CLI] 👤 当前用户: {} ({})", user.display_name(), user.id);
            Ok(())
        }
        None => bail!("本地没有登录会话，请先执行 login"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logger(&args.log_level)?;

    let mut config = ClientConfig::load()?;
    if let Some(url) = args.api_url {
        config.api_base_url = url;
    }
    info!("[CLI] 🚀 SchoolHub CLI，API: {}", config.api_base_url);

    let client = SchoolHubClient::new(config).await?.with_listeners(cli_listeners());

    match args.command {
        Command::Login { email, password } => {
            let user = client.login(&email, &password).await?;
            info!("[CLI] ✅ 登录成功！{} ({})", user.display_name(), user.id);
            client.sync_all().await?;
        }
        Command::Logout => {
            if client.restore_session().await?.is_some() {
                client.logout().await?;
            }
            info!("[CLI] 👋 已退出");
        }
        Command::Sync => {
            require_session(&client).await?;
            client.sync_all().await?;
            info!("[CLI] ✅ 同步完成");
        }
        Command::Announcements => {
            require_session(&client).await?;
            let list = client.workspace().await?.announcements.list().await?;
            info!("[CLI] 📋 公告（共 {} 条）:", list.len());
            for a in list {
                info!("[CLI]   - {} | {} | {}", format_time(a.created_at), a.title, a.state.as_str());
            }
        }
        Command::Missions => {
            require_session(&client).await?;
            let list = client
                .workspace()
                .await?
                .missions
                .upcoming(now_millis())
                .await?;
            info!("[CLI] 📋 未结束的任务（共 {} 个）:", list.len());
            for m in list {
                let places = match m.remaining_places() {
                    Some(n) => n.to_string(),
                    None => "不限".to_string(),
                };
                info!(
                    "[CLI]   - {} | {} | {} | 剩余名额: {}",
                    format_time(m.starts_at),
                    m.title,
                    m.location,
                    places
                );
            }
        }
        Command::Conversations => {
            require_session(&client).await?;
            let ws = client.workspace().await?;
            let list = ws.conversations.list().await?;
            info!("[CLI] 📋 会话列表（共 {} 个）:", list.len());
            for c in list {
                info!(
                    "[CLI]   - {} | 未读: {} | {} | {}",
                    c.id,
                    c.unread_count,
                    format_time(c.activity_at()),
                    c.last_message
                );
            }
            info!("[CLI] 📬 总未读数: {}", ws.conversations.total_unread_count().await?);
        }
        Command::Send { conversation, text } => {
            require_session(&client).await?;
            let message = client.send_message(&conversation, &text).await?;
            info!("[CLI] ✅ 消息已发送: {} ({})", message.id, message.state.as_str());
        }
        Command::Watch {
            conversation,
            duration,
        } => {
            require_session(&client).await?;
            if let Err(e) = client.sync_all().await {
                warn!("[CLI] 初次同步失败: {:#}", e);
            }
            client.connect_realtime().await?;
            info!("[CLI] 🔗 实时连接已建立");

            let _registration = match conversation {
                Some(id) => Some(client.open_conversation(&id).await?),
                None => None,
            };

            if duration > 0 {
                info!("[CLI] ⏰ {} 秒后自动退出", duration);
                sleep(Duration::from_secs(duration)).await;
            } else {
                info!("[CLI] ⏰ 持续运行中，按 Ctrl+C 退出");
                tokio::signal::ctrl_c().await?;
            }
            client.disconnect_realtime().await;
            info!("[CLI] 👋 程序退出");
        }
    }

    Ok(())
}
