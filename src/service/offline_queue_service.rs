use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::context::SessionContext;
use crate::dispatcher::{DispatchOutcome, OfflineDispatcher};
use crate::domain::events::QueueEvent;
use crate::error::{Result, ServerError};
use crate::infra::{Connectivity, EventBus, OfflineSyncWorker};
use crate::offline::{
    ActionSink, Gate, Intent, IntentDescriptor, OfflineQueueManager, QueueStats, ReplayDriver,
    ReplayReport, ReplayStats, SledSnapshotStore, SnapshotStore,
};

/// 离线队列服务
///
/// 把门控、队列、回放驱动和同步 Worker 组装在一起，供宿主状态层使用：
/// - `dispatch` 是唯一的派发入口
/// - `start` 恢复快照（每个实例只恢复一次），之后队列的每次变化都写回快照
/// - `stop` 停止 Worker 并再写一次快照，内存中的队列保持不变，可以再次 `start`
pub struct OfflineQueueService<S: ActionSink> {
    connectivity: Connectivity,
    events: Arc<EventBus>,
    manager: Arc<OfflineQueueManager>,
    dispatcher: OfflineDispatcher<S>,
    driver: Arc<ReplayDriver<S>>,
    worker: Arc<OfflineSyncWorker<S>>,
    store: Option<Arc<dyn SnapshotStore>>,
    restored: AtomicBool,
}

impl<S: ActionSink> OfflineQueueService<S> {
    /// 根据配置创建服务
    pub fn new(config: &AppConfig, sink: S, connectivity: Connectivity) -> Result<Self> {
        config
            .offline
            .validate()
            .map_err(|e| ServerError::Configuration(e.to_string()))?;

        let events = Arc::new(EventBus::with_capacity(config.offline.event_bus_capacity));
        let manager = Arc::new(OfflineQueueManager::from_config(
            &config.offline,
            events.clone(),
        ));
        let sink = Arc::new(sink);

        let dispatcher = OfflineDispatcher::new(
            Gate::from_config(&config.offline),
            manager.clone(),
            sink.clone(),
            connectivity.clone(),
        );
        let driver = Arc::new(ReplayDriver::new(
            manager.clone(),
            sink,
            connectivity.clone(),
        ));
        let worker = Arc::new(OfflineSyncWorker::new(
            driver.clone(),
            connectivity.clone(),
        ));

        Ok(Self {
            connectivity,
            events,
            manager,
            dispatcher,
            driver,
            worker,
            store: None,
            restored: AtomicBool::new(false),
        })
    }

    /// 根据配置创建服务，启用持久化时打开 sled 快照存储
    pub fn from_config(config: &AppConfig, sink: S, connectivity: Connectivity) -> Result<Self> {
        let service = Self::new(config, sink, connectivity)?;
        if !config.persistence.enabled {
            return Ok(service);
        }

        let store = SledSnapshotStore::open(&config.persistence.path)?;
        info!("Queue snapshots enabled at {}", config.persistence.path);
        Ok(service.with_store(Arc::new(store)))
    }

    /// 设置快照存储
    pub fn with_store(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    pub fn gate(&self) -> &Gate {
        self.dispatcher.gate()
    }

    pub fn manager(&self) -> &Arc<OfflineQueueManager> {
        &self.manager
    }

    /// 派发一个意图
    pub async fn dispatch(
        &self,
        descriptor: IntentDescriptor,
        session: &SessionContext,
    ) -> Result<DispatchOutcome> {
        self.dispatcher.dispatch(descriptor, session).await
    }

    /// 立即回放一次（不等待连接状态变化）
    pub async fn replay_now(&self) -> ReplayReport {
        self.driver.drain().await
    }

    /// 订阅队列事件
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }

    pub async fn stats(&self) -> QueueStats {
        self.manager.stats().await
    }

    pub fn replay_stats(&self) -> ReplayStats {
        self.driver.stats()
    }

    /// 当前队列（按回放顺序）
    pub async fn snapshot(&self) -> Vec<Intent> {
        self.manager.snapshot().await
    }

    /// 恢复快照并挂载写穿存储，然后启动同步 Worker
    pub async fn start(&self) -> Result<()> {
        if let Some(store) = &self.store {
            if !self.restored.load(Ordering::SeqCst) {
                self.manager.restore_from(store.as_ref()).await?;
                self.restored.store(true, Ordering::SeqCst);
            }
            self.manager.attach_store(store.clone()).await?;
        }

        self.worker
            .start()
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))?;
        info!("Offline queue service started");
        Ok(())
    }

    /// 停止同步 Worker，把剩余队列写回快照
    pub async fn stop(&self) -> Result<()> {
        if let Err(e) = self.worker.stop().await {
            warn!("Sync worker did not stop cleanly: {}", e);
        }

        if let Some(store) = &self.store {
            let persisted = self.manager.persist_to(store.as_ref()).await?;
            info!("Persisted {} queued intents on shutdown", persisted);
        }

        info!("Offline queue service stopped");
        Ok(())
    }
}
