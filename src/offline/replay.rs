use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::intent::FailureReport;
use super::queue::OfflineQueueManager;
use crate::domain::events::QueueEvent;
use crate::error::{Result, ServerError};
use crate::infra::Connectivity;

/// 动作执行端 Trait
///
/// 真正执行意图（例如发起网络请求）。超时由实现方负责，
/// 回放只关心成功或失败。
#[async_trait::async_trait]
pub trait ActionSink: Send + Sync + 'static {
    async fn execute(&self, action_type: &str, payload: &Value) -> Result<()>;
}

#[async_trait::async_trait]
impl<T: ActionSink + ?Sized> ActionSink for Arc<T> {
    async fn execute(&self, action_type: &str, payload: &Value) -> Result<()> {
        (**self).execute(action_type, payload).await
    }
}

/// 简单的日志执行端（用于模拟和开发）
///
/// 列在 `failing` 中的动作类型总是失败。
#[derive(Debug, Clone, Default)]
pub struct LogActionSink {
    failing: HashSet<String>,
}

impl LogActionSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failing(mut self, action_types: impl IntoIterator<Item = String>) -> Self {
        self.failing.extend(action_types);
        self
    }
}

#[async_trait::async_trait]
impl ActionSink for LogActionSink {
    async fn execute(&self, action_type: &str, payload: &Value) -> Result<()> {
        if self.failing.contains(action_type) {
            warn!("Simulated failure executing {}", action_type);
            return Err(ServerError::Network(format!("simulated failure for {}", action_type)));
        }

        info!("Executing {} with payload {}", action_type, payload);
        Ok(())
    }
}

/// 单次回放结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplayReport {
    /// 成功回放数
    pub replayed: usize,
    /// 失败后放回队列的次数
    pub retried: usize,
    /// 重试耗尽的意图
    pub failures: Vec<FailureReport>,
    /// 是否因断网提前停止
    pub halted: bool,
    /// 回放结束时仍在队列中的数量
    pub remaining: usize,
}

/// 回放统计信息
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplayStats {
    pub total_drains: u64,
    pub total_replayed: u64,
    pub total_retried: u64,
    pub total_failed: u64,
    pub total_halted: u64,
    pub last_drain_at: Option<DateTime<Utc>>,
}

/// 回放驱动
///
/// 连接恢复后按优先级顺序逐个执行队列中的意图。同一时间只有一次回放在跑，
/// 执行端调用未返回前不会处理下一个意图；每个意图执行前都会重新读取连接状态。
pub struct ReplayDriver<S: ActionSink> {
    manager: Arc<OfflineQueueManager>,
    sink: Arc<S>,
    connectivity: Connectivity,
    drain_lock: tokio::sync::Mutex<()>,
    stats: Mutex<ReplayStats>,
}

impl<S: ActionSink> ReplayDriver<S> {
    pub fn new(manager: Arc<OfflineQueueManager>, sink: Arc<S>, connectivity: Connectivity) -> Self {
        Self {
            manager,
            sink,
            connectivity,
            drain_lock: tokio::sync::Mutex::new(()),
            stats: Mutex::new(ReplayStats::default()),
        }
    }

    pub fn manager(&self) -> &Arc<OfflineQueueManager> {
        &self.manager
    }

    pub fn stats(&self) -> ReplayStats {
        self.stats.lock().clone()
    }

    /// 回放队列直到清空或断网
    pub async fn drain(&self) -> ReplayReport {
        let _guard = self.drain_lock.lock().await;
        let start_time = Instant::now();
        let mut report = ReplayReport::default();

        loop {
            if !self.connectivity.is_online() {
                let remaining = self.manager.len().await;
                if remaining > 0 {
                    report.halted = true;
                    info!("Connectivity lost, halting replay with {} intents queued", remaining);
                    self.manager
                        .events()
                        .publish(QueueEvent::ReplayHalted { remaining });
                }
                break;
            }

            let Some(intent) = self.manager.pop_next().await else {
                break;
            };

            match self.sink.execute(&intent.action_type, &intent.payload).await {
                Ok(()) => {
                    report.replayed += 1;
                    self.manager.complete(&intent).await;
                }
                Err(e) => {
                    warn!(
                        "Replay of intent {} ({}) failed: {}",
                        intent.id, intent.action_type, e
                    );
                    match self.manager.record_failure(intent).await {
                        Some(failure) => report.failures.push(failure),
                        None => report.retried += 1,
                    }
                }
            }
        }

        report.remaining = self.manager.len().await;

        {
            let mut stats = self.stats.lock();
            stats.total_drains += 1;
            stats.total_replayed += report.replayed as u64;
            stats.total_retried += report.retried as u64;
            stats.total_failed += report.failures.len() as u64;
            if report.halted {
                stats.total_halted += 1;
            }
            stats.last_drain_at = Some(Utc::now());
        }

        debug!(
            "Replay finished in {:?}: {} replayed, {} retried, {} failed, {} remaining",
            start_time.elapsed(),
            report.replayed,
            report.retried,
            report.failures.len(),
            report.remaining
        );

        report
    }
}
