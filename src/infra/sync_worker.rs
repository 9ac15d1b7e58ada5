use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;
use tokio::sync::{watch, Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::infra::Connectivity;
use crate::offline::{ActionSink, ReplayDriver, ReplayReport};

/// 离线队列同步 Worker（事件驱动模式）
///
/// 订阅连接状态，每次变为在线时触发一次回放；启动时如果已经在线也会回放一次。
/// 在线期间收到入队通知也会回放：派发方读到离线后才完成入队时，
/// 连接可能已经恢复，而那次状态变化的回放看到的是空队列。
pub struct OfflineSyncWorker<S: ActionSink> {
    /// 回放驱动
    driver: Arc<ReplayDriver<S>>,
    /// 连接状态
    connectivity: Connectivity,
    /// 运行状态
    is_running: Arc<RwLock<bool>>,
    /// 停止信号
    shutdown: Arc<Notify>,
    /// 主循环任务
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl<S: ActionSink> OfflineSyncWorker<S> {
    pub fn new(driver: Arc<ReplayDriver<S>>, connectivity: Connectivity) -> Self {
        Self {
            driver,
            connectivity,
            is_running: Arc::new(RwLock::new(false)),
            shutdown: Arc::new(Notify::new()),
            handle: Mutex::new(None),
        }
    }

    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    /// 启动 Worker 主循环
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        {
            let mut running = self.is_running.write().await;
            if *running {
                return Err(anyhow::anyhow!("Sync worker is already running"));
            }
            *running = true;
        }

        // 先订阅再启动任务，避免漏掉启动期间的状态变化
        let rx = self.connectivity.subscribe();
        let worker = Arc::clone(self);
        let handle = tokio::spawn(async move {
            worker.run(rx).await;
        });
        *self.handle.lock() = Some(handle);

        info!("Offline sync worker started");
        Ok(())
    }

    /// 停止 Worker，等待正在进行的回放结束
    pub async fn stop(&self) -> Result<()> {
        {
            let mut running = self.is_running.write().await;
            if !*running {
                return Ok(());
            }
            *running = false;
        }

        self.shutdown.notify_one();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            handle.await?;
        }

        info!("Offline sync worker stopped");
        Ok(())
    }

    async fn run(&self, mut rx: watch::Receiver<bool>) {
        if *rx.borrow_and_update() {
            self.replay().await;
        }

        loop {
            tokio::select! {
                changed = rx.changed() => {
                    if changed.is_err() {
                        info!("Connectivity channel closed, exiting sync loop");
                        break;
                    }
                    let online = *rx.borrow_and_update();
                    if online {
                        self.replay().await;
                    }
                }
                _ = self.driver.manager().pending().notified() => {
                    if self.connectivity.is_online() {
                        debug!("Intent queued while online, replaying");
                        self.replay().await;
                    }
                }
                _ = self.shutdown.notified() => {
                    debug!("Sync worker received shutdown signal");
                    break;
                }
            }
        }
    }

    async fn replay(&self) -> Option<ReplayReport> {
        if self.driver.manager().is_empty().await {
            return None;
        }

        info!("Replaying queued intents");
        let report = self.driver.drain().await;

        for failure in &report.failures {
            warn!(
                "Intent {} ({}) permanently failed: {:?}",
                failure.intent_id, failure.action_type, failure.reason
            );
        }
        info!(
            "Replay complete: {} replayed, {} retried, {} failed, {} remaining{}",
            report.replayed,
            report.retried,
            report.failures.len(),
            report.remaining,
            if report.halted { " (halted: offline)" } else { "" }
        );

        Some(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SessionContext;
    use crate::error::Result as QueueResult;
    use crate::infra::EventBus;
    use crate::offline::{IntentDescriptor, IntentPriority, OfflineQueueManager};
    use serde_json::{json, Value};
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingSink {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl ActionSink for RecordingSink {
        async fn execute(&self, action_type: &str, _payload: &Value) -> QueueResult<()> {
            self.calls.lock().push(action_type.to_string());
            Ok(())
        }
    }

    async fn wait_for_calls(sink: &RecordingSink, expected: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while sink.calls.lock().len() < expected {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("sink was not called in time");
    }

    #[tokio::test]
    async fn test_worker_replays_on_reconnect() {
        let connectivity = Connectivity::offline();
        let manager = Arc::new(OfflineQueueManager::new(3, Arc::new(EventBus::new())));
        let sink = Arc::new(RecordingSink::default());
        let driver = Arc::new(ReplayDriver::new(manager.clone(), sink.clone(), connectivity.clone()));
        let worker = Arc::new(OfflineSyncWorker::new(driver, connectivity.clone()));

        worker.start().await.unwrap();
        assert!(worker.start().await.is_err());

        manager
            .enqueue(
                IntentDescriptor::new("orders/createOrder", json!({})).unwrap(),
                IntentPriority::High,
                &SessionContext::new(),
            )
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(sink.calls.lock().is_empty());

        connectivity.set_online(true);
        wait_for_calls(&sink, 1).await;
        assert_eq!(*sink.calls.lock(), vec!["orders/createOrder".to_string()]);

        worker.stop().await.unwrap();
        assert!(!worker.is_running().await);
    }

    #[tokio::test]
    async fn test_worker_drains_on_start_when_already_online() {
        let connectivity = Connectivity::online();
        let manager = Arc::new(OfflineQueueManager::new(3, Arc::new(EventBus::new())));
        manager
            .enqueue(
                IntentDescriptor::new("user/updateProfile", json!({})).unwrap(),
                IntentPriority::Medium,
                &SessionContext::new(),
            )
            .await
            .unwrap();

        let sink = Arc::new(RecordingSink::default());
        let driver = Arc::new(ReplayDriver::new(manager.clone(), sink.clone(), connectivity.clone()));
        let worker = Arc::new(OfflineSyncWorker::new(driver, connectivity));

        worker.start().await.unwrap();
        wait_for_calls(&sink, 1).await;
        worker.stop().await.unwrap();

        assert!(manager.is_empty().await);
    }

    #[tokio::test]
    async fn test_intent_queued_after_reconnect_is_not_stranded() {
        // 派发方读到离线后，连接先恢复，入队才完成
        let connectivity = Connectivity::offline();
        let manager = Arc::new(OfflineQueueManager::new(3, Arc::new(EventBus::new())));
        let sink = Arc::new(RecordingSink::default());
        let driver = Arc::new(ReplayDriver::new(manager.clone(), sink.clone(), connectivity.clone()));
        let worker = Arc::new(OfflineSyncWorker::new(driver, connectivity.clone()));
        worker.start().await.unwrap();

        connectivity.set_online(true);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(sink.calls.lock().is_empty());

        manager
            .enqueue(
                IntentDescriptor::new("orders/cancelOrder", json!({ "orderId": "late" })).unwrap(),
                IntentPriority::High,
                &SessionContext::new(),
            )
            .await
            .unwrap();

        wait_for_calls(&sink, 1).await;
        assert_eq!(*sink.calls.lock(), vec!["orders/cancelOrder".to_string()]);
        worker.stop().await.unwrap();
        assert!(manager.is_empty().await);
    }
}
