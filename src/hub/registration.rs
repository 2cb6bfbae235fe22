//! 监听注册句柄：持有后台任务，移除或 drop 时停止任务并执行清理

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

type Cleanup = Box<dyn FnOnce() + Send + 'static>;

/// 监听注册句柄（对应页面生命周期：页面离开时 drop 即可拆除监听）
pub struct ListenerRegistration {
    name: String,
    task: Option<JoinHandle<()>>,
    cleanup: Option<Cleanup>,
}

impl ListenerRegistration {
    /// 包装一个后台任务
    pub fn from_task(name: impl Into<String>, task: JoinHandle<()>) -> Self {
        Self {
            name: name.into(),
            task: Some(task),
            cleanup: None,
        }
    }

    /// 只有清理动作、没有后台任务的注册（如取消一次远端订阅）
    pub fn from_cleanup(name: impl Into<String>, cleanup: impl FnOnce() + Send + 'static) -> Self {
        Self {
            name: name.into(),
            task: None,
            cleanup: Some(Box::new(cleanup)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 后台任务是否仍在运行
    pub fn is_active(&self) -> bool {
        match &self.task {
            Some(task) => !task.is_finished(),
            None => self.cleanup.is_some(),
        }
    }

    /// 主动移除监听
    pub fn remove(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("[Registration] 已停止监听任务: {}", self.name);
        }
        if let Some(cleanup) = self.cleanup.take() {
            cleanup();
        }
    }
}

impl Drop for ListenerRegistration {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// 周期性执行 `tick`，失败只记录日志（不重试、不退避）
pub fn spawn_polling<T, F, Fut>(
    name: &str,
    target: Arc<T>,
    period: Duration,
    tick: F,
) -> ListenerRegistration
where
    T: Send + Sync + 'static,
    F: Fn(Arc<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    let task_name = name.to_string();
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if let Err(e) = tick(target.clone()).await {
                warn!("[Registration] 轮询 {} 失败: {:#}", task_name, e);
            }
        }
    });
    ListenerRegistration::from_task(name, task)
}
