//! 实时监听（WebSocket）
//!
//! 客户端发送 listen / unlisten 订阅某个集合（消息需要带 parentID 指定会话），
//! 服务器以 snapshot 帧推送增量变更。开启 gzip 时双向都使用压缩后的二进制帧。
//! 连接句柄 drop 时停止读取与心跳任务。

use crate::hub::config::ClientConfig;
use crate::hub::reconcile::RawChange;
use crate::hub::serialization::{compress_gzip, decompress_gzip};
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, AUTHORIZATION};
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

/// WebSocket 写入端类型别名
pub type WsWriter = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;

/// WebSocket 读取端类型别名
pub type WsReader = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// 可监听的集合
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Announcements,
    Missions,
    Conversations,
    Messages,
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Collection::Announcements => "announcements",
            Collection::Missions => "missions",
            Collection::Conversations => "conversations",
            Collection::Messages => "messages",
        };
        f.write_str(name)
    }
}

/// 客户端发送的帧
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientFrame {
    Listen {
        collection: Collection,
        #[serde(rename = "parentID", skip_serializing_if = "Option::is_none")]
        parent_id: Option<String>,
    },
    Unlisten {
        collection: Collection,
        #[serde(rename = "parentID", skip_serializing_if = "Option::is_none")]
        parent_id: Option<String>,
    },
    Ping,
}

/// 一次快照推送
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Snapshot {
    pub collection: Collection,
    #[serde(rename = "parentID", default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub changes: Vec<RawChange>,
}

/// 服务器推送的帧
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerFrame {
    Snapshot(Snapshot),
    Pong,
    Error { message: String },
}

/// 快照接收方（由客户端门面实现，按集合分发到各仓库）
#[async_trait]
pub trait SnapshotSink: Send + Sync {
    async fn on_snapshot(&self, snapshot: Snapshot);

    async fn on_connection_changed(&self, _connected: bool, _reason: String) {}
}

/// 解析收到的 WebSocket 帧；控制帧返回 None
pub fn parse_frame(message: WsMessage) -> Result<Option<ServerFrame>> {
    match message {
        WsMessage::Text(text) => {
            let frame = serde_json::from_str(&text).context("解析文本帧失败")?;
            Ok(Some(frame))
        }
        WsMessage::Binary(data) => {
            let payload = if data.len() >= 2 && data[0] == 0x1f && data[1] == 0x8b {
                decompress_gzip(&data).context("解压二进制帧失败")?
            } else {
                data
            };
            let frame = serde_json::from_slice(&payload).context("解析二进制帧失败")?;
            Ok(Some(frame))
        }
        _ => Ok(None),
    }
}

/// 编码要发送的帧
pub fn encode_frame(frame: &ClientFrame, gzip: bool) -> Result<WsMessage> {
    let json = serde_json::to_vec(frame)?;
    if gzip {
        Ok(WsMessage::Binary(compress_gzip(&json)?))
    } else {
        Ok(WsMessage::Text(String::from_utf8(json)?))
    }
}

type ListenKey = (Collection, Option<String>);

/// 可克隆的发送端：发送 listen / unlisten
#[derive(Clone)]
pub struct RealtimeHandle {
    writer: Arc<Mutex<WsWriter>>,
    gzip: bool,
    listening: Arc<Mutex<HashSet<ListenKey>>>,
}

impl RealtimeHandle {
    async fn send(&self, frame: &ClientFrame) -> Result<()> {
        let message = encode_frame(frame, self.gzip)?;
        let mut w = self.writer.lock().await;
        w.send(message).await.context("发送 WebSocket 帧失败")?;
        Ok(())
    }

    /// 订阅集合；重复订阅只发送一次
    pub async fn listen(&self, collection: Collection, parent_id: Option<String>) -> Result<()> {
        let key = (collection, parent_id.clone());
        if !self.listening.lock().await.insert(key.clone()) {
            return Ok(());
        }
        info!("[Realtime] 👂 订阅 {} {:?}", collection, parent_id);
        let sent = self
            .send(&ClientFrame::Listen {
                collection,
                parent_id,
            })
            .await;
        if sent.is_err() {
            // 未送达，撤销记录以便重连后重新订阅
            self.listening.lock().await.remove(&key);
        }
        sent
    }

    pub async fn unlisten(&self, collection: Collection, parent_id: Option<String>) -> Result<()> {
        let key = (collection, parent_id.clone());
        if !self.listening.lock().await.remove(&key) {
            return Ok(());
        }
        info!("[Realtime] 取消订阅 {} {:?}", collection, parent_id);
        self.send(&ClientFrame::Unlisten {
            collection,
            parent_id,
        })
        .await
    }

    pub async fn is_listening(&self, collection: Collection, parent_id: Option<&str>) -> bool {
        self.listening
            .lock()
            .await
            .contains(&(collection, parent_id.map(|s| s.to_string())))
    }
}

/// 实时连接，drop 时停止后台任务
pub struct RealtimeConnection {
    handle: RealtimeHandle,
    tasks: Vec<JoinHandle<()>>,
}

impl RealtimeConnection {
    /// 建立连接并启动读取与心跳任务
    pub async fn connect(
        config: &ClientConfig,
        token: &str,
        sink: Arc<dyn SnapshotSink>,
    ) -> Result<Self> {
        let mut request = config
            .ws_url
            .as_str()
            .into_client_request()
            .context("无效的 WebSocket 地址")?;
        request.headers_mut().insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).context("无效的 token")?,
        );

        info!("[Realtime] 🔗 连接实时服务: {}", config.ws_url);
        let (ws_stream, response) = connect_async(request)
            .await
            .context("WebSocket 连接失败")?;
        info!(
            "[Realtime] ✅ WebSocket 连接成功, 状态: {}",
            response.status()
        );

        let (write, read) = ws_stream.split();
        let handle = RealtimeHandle {
            writer: Arc::new(Mutex::new(write)),
            gzip: config.gzip_enabled(),
            listening: Arc::new(Mutex::new(HashSet::new())),
        };
        sink.on_connection_changed(true, "连接成功".to_string()).await;

        let heartbeat = {
            let handle = handle.clone();
            let period = config.heartbeat_interval();
            tokio::spawn(async move {
                let mut ticker = interval(period);
                // 第一次 tick 立即触发，跳过
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    if let Err(e) = handle.send(&ClientFrame::Ping).await {
                        warn!("[Realtime] 💓 心跳发送失败，停止心跳: {:#}", e);
                        break;
                    }
                }
            })
        };

        let reader = tokio::spawn(async move {
            let reason = handle_frames(read, sink.clone()).await;
            sink.on_connection_changed(false, reason).await;
        });

        Ok(Self {
            handle,
            tasks: vec![heartbeat, reader],
        })
    }

    pub fn handle(&self) -> RealtimeHandle {
        self.handle.clone()
    }

    /// 读取任务是否仍在运行
    pub fn is_connected(&self) -> bool {
        self.tasks.iter().all(|t| !t.is_finished())
    }

    /// 主动关闭连接
    pub async fn close(mut self) {
        {
            let mut w = self.handle.writer.lock().await;
            if let Err(e) = w.send(WsMessage::Close(None)).await {
                debug!("[Realtime] 发送关闭帧失败: {}", e);
            }
        }
        self.stop();
    }

    fn stop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for RealtimeConnection {
    fn drop(&mut self) {
        self.stop();
    }
}

/// 读取循环，返回断开原因
async fn handle_frames(mut read: WsReader, sink: Arc<dyn SnapshotSink>) -> String {
    while let Some(msg_result) = read.next().await {
        let message = match msg_result {
            Ok(WsMessage::Close(frame)) => {
                warn!("[Realtime] 👋 连接关闭: {:?}", frame);
                return "服务器关闭连接".to_string();
            }
            Ok(message) => message,
            Err(e) => {
                error!("[Realtime] WebSocket 错误: {}", e);
                return format!("WebSocket 错误: {}", e);
            }
        };
        match parse_frame(message) {
            Ok(Some(ServerFrame::Snapshot(snapshot))) => {
                debug!(
                    "[Realtime] 📥 快照 {} {:?}，变更 {} 条",
                    snapshot.collection,
                    snapshot.parent_id,
                    snapshot.changes.len()
                );
                sink.on_snapshot(snapshot).await;
            }
            Ok(Some(ServerFrame::Pong)) => debug!("[Realtime] 💓 pong"),
            Ok(Some(ServerFrame::Error { message })) => {
                warn!("[Realtime] 服务器错误: {}", message)
            }
            Ok(None) => {}
            Err(e) => warn!("[Realtime] 忽略无法解析的帧: {:#}", e),
        }
    }
    "连接已结束".to_string()
}
