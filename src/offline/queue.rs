use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use parking_lot::RwLock;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info, warn};

use super::intent::{
    Acknowledgment, FailureReport, Intent, IntentDescriptor, IntentMetadata, IntentPriority,
};
use super::storage::SnapshotStore;
use crate::config::OfflineConfig;
use crate::context::SessionContext;
use crate::domain::events::QueueEvent;
use crate::error::Result;
use crate::infra::metrics;
use crate::infra::EventBus;

/// 队列统计信息
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueStats {
    /// 总意图数
    pub total_intents: usize,
    /// 高优先级数量
    pub high: usize,
    /// 中优先级数量
    pub medium: usize,
    /// 低优先级数量
    pub low: usize,
    /// 最早入队时间
    pub oldest_created_at: Option<DateTime<Utc>>,
}

/// 分层队列
///
/// 每个优先级一个 FIFO；取出时高 → 中 → 低，同层按入队顺序。
/// 失败重试的意图放回所在层的队尾。
#[derive(Debug, Default)]
pub struct OfflineQueue {
    tiers: [VecDeque<Intent>; 3],
    next_sequence: u64,
}

impl OfflineQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// 分配下一个逻辑时间戳
    pub fn next_sequence(&mut self) -> u64 {
        self.next_sequence += 1;
        self.next_sequence
    }

    /// 追加到所在优先级的队尾
    pub fn push_back(&mut self, intent: Intent) {
        self.tiers[intent.priority.tier_index()].push_back(intent);
    }

    /// 取出优先级最高、入队最早的意图
    pub fn pop_front(&mut self) -> Option<Intent> {
        self.tiers.iter_mut().find_map(|tier| tier.pop_front())
    }

    pub fn len(&self) -> usize {
        self.tiers.iter().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.iter().all(VecDeque::is_empty)
    }

    pub fn tier_len(&self, priority: IntentPriority) -> usize {
        self.tiers[priority.tier_index()].len()
    }

    /// 按回放顺序遍历
    pub fn iter(&self) -> impl Iterator<Item = &Intent> {
        self.tiers.iter().flatten()
    }

    pub fn snapshot(&self) -> Vec<Intent> {
        self.iter().cloned().collect()
    }

    /// 恢复快照
    ///
    /// 恢复的意图早于当前进程内的任何意图，放在各层的队首，
    /// 层内保持快照中的相对顺序。逻辑时间戳按恢复顺序重新分配，
    /// 保证与本进程内已分配的序号不重复。
    pub fn restore(&mut self, intents: Vec<Intent>) -> usize {
        let count = intents.len();
        let mut restored: [VecDeque<Intent>; 3] = Default::default();

        for mut intent in intents {
            intent.enqueued_at = self.next_sequence();
            restored[intent.priority.tier_index()].push_back(intent);
        }

        for (tier, mut head) in self.tiers.iter_mut().zip(restored) {
            head.append(tier);
            *tier = head;
        }

        count
    }

    pub fn clear(&mut self) -> usize {
        let removed = self.len();
        for tier in &mut self.tiers {
            tier.clear();
        }
        removed
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            total_intents: self.len(),
            high: self.tier_len(IntentPriority::High),
            medium: self.tier_len(IntentPriority::Medium),
            low: self.tier_len(IntentPriority::Low),
            oldest_created_at: self.iter().map(|intent| intent.created_at).min(),
        }
    }
}

/// 离线队列管理器
///
/// 所有入队、取出、重排都在同一把锁内完成，锁不会跨越执行端调用。
/// 挂载快照存储后，每次入队、回放成功、重排或移除后都会整体写回快照；
/// 正在执行的意图直到有结果才从快照中消失。
pub struct OfflineQueueManager {
    /// 分层队列
    queue: Mutex<OfflineQueue>,
    /// 每个意图的重试预算
    max_retries: u32,
    /// 事件总线
    events: Arc<EventBus>,
    /// 写穿的快照存储
    store: RwLock<Option<Arc<dyn SnapshotStore>>>,
    /// 串行化快照写入，保证后写入的快照不旧于先写入的
    persist_lock: Mutex<()>,
    /// 每次入队都会通知，供同步 Worker 在在线时补一次回放
    pending: Notify,
    /// 已取出、尚无结果的意图
    in_flight: RwLock<Option<Intent>>,
}

impl OfflineQueueManager {
    pub fn new(max_retries: u32, events: Arc<EventBus>) -> Self {
        Self {
            queue: Mutex::new(OfflineQueue::new()),
            max_retries,
            events,
            store: RwLock::new(None),
            persist_lock: Mutex::new(()),
            pending: Notify::new(),
            in_flight: RwLock::new(None),
        }
    }

    pub fn from_config(config: &OfflineConfig, events: Arc<EventBus>) -> Self {
        Self::new(config.max_retries, events)
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// 入队通知
    pub fn pending(&self) -> &Notify {
        &self.pending
    }

    /// 挂载快照存储，并立即写入当前队列
    pub async fn attach_store(&self, store: Arc<dyn SnapshotStore>) -> Result<usize> {
        *self.store.write() = Some(store.clone());
        self.write_snapshot(store.as_ref()).await
    }

    async fn write_snapshot<S: SnapshotStore + ?Sized>(&self, store: &S) -> Result<usize> {
        let _guard = self.persist_lock.lock().await;
        let snapshot = {
            let queue = self.queue.lock().await;
            let mut intents = Vec::with_capacity(queue.len() + 1);
            intents.extend(self.in_flight.read().clone());
            intents.extend(queue.iter().cloned());
            intents
        };
        store.save(&snapshot).await?;
        Ok(snapshot.len())
    }

    /// 队列变化后写回快照；失败只记录日志，不影响队列本身
    async fn sync_store(&self) {
        let store = self.store.read().clone();
        let Some(store) = store else {
            return;
        };
        if let Err(e) = self.write_snapshot(store.as_ref()).await {
            warn!("Failed to write queue snapshot: {}", e);
        }
    }

    /// 入队
    ///
    /// 不去重：同一个动作入队两次就是两个条目。
    pub async fn enqueue(
        &self,
        descriptor: IntentDescriptor,
        priority: IntentPriority,
        session: &SessionContext,
    ) -> Result<Acknowledgment> {
        descriptor.validate()?;

        let metadata = IntentMetadata::collect(&descriptor.payload, session);
        let ack = Acknowledgment::queued(descriptor.clone());

        let (intent_id, depth) = {
            let mut queue = self.queue.lock().await;
            let sequence = queue.next_sequence();
            let intent = Intent::new(descriptor, priority, self.max_retries, metadata, sequence);
            let intent_id = intent.id;
            queue.push_back(intent);
            (intent_id, queue.len())
        };

        metrics::record_queued(priority.as_str());
        metrics::record_queue_depth(depth);
        debug!(
            "Queued intent {} ({}, priority {}), depth {}",
            intent_id, ack.intent.action_type, priority, depth
        );

        self.events.publish(QueueEvent::Queued {
            intent_id,
            action_type: ack.intent.action_type.clone(),
            priority,
            depth,
        });

        self.sync_store().await;
        self.pending.notify_one();
        Ok(ack)
    }

    /// 取出下一个待回放的意图
    pub async fn pop_next(&self) -> Option<Intent> {
        let mut queue = self.queue.lock().await;
        let intent = queue.pop_front();
        if let Some(intent) = &intent {
            *self.in_flight.write() = Some(intent.clone());
            metrics::record_queue_depth(queue.len());
        }
        intent
    }

    /// 回放成功
    pub async fn complete(&self, intent: &Intent) {
        self.in_flight.write().take();
        metrics::record_replayed();
        debug!("Replayed intent {} ({})", intent.id, intent.action_type);
        self.events.publish(QueueEvent::Replayed {
            intent_id: intent.id,
            action_type: intent.action_type.clone(),
        });
        self.sync_store().await;
    }

    /// 回放失败
    ///
    /// 仍有重试次数时放回所在层队尾并返回 None；
    /// 重试耗尽时移除并返回失败报告。
    pub async fn record_failure(&self, mut intent: Intent) -> Option<FailureReport> {
        if intent.record_failure() {
            let intent_id = intent.id;
            let action_type = intent.action_type.clone();
            let retries_remaining = intent.retries_remaining;

            let depth = {
                let mut queue = self.queue.lock().await;
                self.in_flight.write().take();
                queue.push_back(intent);
                queue.len()
            };

            metrics::record_retried();
            metrics::record_queue_depth(depth);
            debug!(
                "Intent {} ({}) failed, {} retries left",
                intent_id, action_type, retries_remaining
            );
            self.events.publish(QueueEvent::Retrying {
                intent_id,
                action_type,
                retries_remaining,
            });
            self.sync_store().await;
            None
        } else {
            self.in_flight.write().take();
            let report = FailureReport::retries_exhausted(&intent);
            metrics::record_failed();
            warn!(
                "Intent {} ({}) exhausted its retries, dropping (order: {:?}, user: {:?})",
                intent.id, intent.action_type, intent.metadata.order_id, intent.metadata.user_id
            );
            self.events.publish(QueueEvent::PermanentlyFailed(report.clone()));
            self.sync_store().await;
            Some(report)
        }
    }

    pub async fn len(&self) -> usize {
        self.queue.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.queue.lock().await.is_empty()
    }

    /// 按回放顺序返回当前队列内容
    pub async fn snapshot(&self) -> Vec<Intent> {
        self.queue.lock().await.snapshot()
    }

    pub async fn stats(&self) -> QueueStats {
        self.queue.lock().await.stats()
    }

    /// 清空队列（例如用户登出）
    pub async fn clear(&self) -> usize {
        let removed = {
            let mut queue = self.queue.lock().await;
            self.in_flight.write().take();
            queue.clear()
        };
        metrics::record_queue_depth(0);
        info!("Cleared {} queued intents", removed);
        self.sync_store().await;
        removed
    }

    /// 持久化当前队列
    pub async fn persist_to<S: SnapshotStore + ?Sized>(&self, store: &S) -> Result<usize> {
        let persisted = self.write_snapshot(store).await?;
        debug!("Persisted {} queued intents", persisted);
        Ok(persisted)
    }

    /// 从存储恢复队列
    pub async fn restore_from<S: SnapshotStore + ?Sized>(&self, store: &S) -> Result<usize> {
        let intents = store.load().await?;
        let restored = {
            let mut queue = self.queue.lock().await;
            let restored = queue.restore(intents);
            metrics::record_queue_depth(queue.len());
            restored
        };
        info!("Restored {} queued intents from storage", restored);
        Ok(restored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServerError;
    use crate::offline::storage::MemorySnapshotStore;
    use serde_json::json;

    fn descriptor(action_type: &str) -> IntentDescriptor {
        IntentDescriptor::new(action_type, json!({})).unwrap()
    }

    fn manager(max_retries: u32) -> OfflineQueueManager {
        OfflineQueueManager::new(max_retries, Arc::new(EventBus::new()))
    }

    async fn drain_types(manager: &OfflineQueueManager) -> Vec<String> {
        let mut types = Vec::new();
        while let Some(intent) = manager.pop_next().await {
            types.push(intent.action_type);
        }
        types
    }

    #[tokio::test]
    async fn test_tiers_drain_high_medium_low() {
        let manager = manager(3);
        let session = SessionContext::new();

        manager.enqueue(descriptor("menu/rateItem"), IntentPriority::Low, &session).await.unwrap();
        manager.enqueue(descriptor("orders/createOrder"), IntentPriority::High, &session).await.unwrap();
        manager.enqueue(descriptor("user/updateProfile"), IntentPriority::Medium, &session).await.unwrap();

        assert_eq!(
            drain_types(&manager).await,
            vec!["orders/createOrder", "user/updateProfile", "menu/rateItem"]
        );
    }

    #[tokio::test]
    async fn test_fifo_within_tier_and_no_dedup() {
        let manager = manager(3);
        let session = SessionContext::new();

        let a = IntentDescriptor::new("orders/createOrder", json!({ "orderId": "A" })).unwrap();
        let b = IntentDescriptor::new("orders/createOrder", json!({ "orderId": "B" })).unwrap();
        manager.enqueue(a.clone(), IntentPriority::High, &session).await.unwrap();
        manager.enqueue(b, IntentPriority::High, &session).await.unwrap();
        manager.enqueue(a, IntentPriority::High, &session).await.unwrap();

        let snapshot = manager.snapshot().await;
        let order_ids: Vec<_> = snapshot
            .iter()
            .map(|intent| intent.metadata.order_id.clone().unwrap())
            .collect();
        assert_eq!(order_ids, vec!["A", "B", "A"]);
        assert!(snapshot.windows(2).all(|w| w[0].enqueued_at < w[1].enqueued_at));
    }

    #[tokio::test]
    async fn test_enqueue_rejects_missing_action_type() {
        let manager = manager(3);
        let malformed = IntentDescriptor {
            action_type: String::new(),
            payload: json!({}),
        };
        let err = manager
            .enqueue(malformed, IntentPriority::Low, &SessionContext::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::Validation(_)));
        assert!(manager.is_empty().await);
    }

    #[tokio::test]
    async fn test_failed_intent_goes_to_tail_of_its_tier() {
        let manager = manager(3);
        let session = SessionContext::new();
        manager.enqueue(descriptor("orders/createOrder"), IntentPriority::High, &session).await.unwrap();
        manager.enqueue(descriptor("orders/updateOrder"), IntentPriority::High, &session).await.unwrap();
        manager.enqueue(descriptor("user/updateProfile"), IntentPriority::Medium, &session).await.unwrap();

        let first = manager.pop_next().await.unwrap();
        assert!(manager.record_failure(first).await.is_none());

        let snapshot = manager.snapshot().await;
        let types: Vec<_> = snapshot.iter().map(|i| i.action_type.as_str()).collect();
        assert_eq!(types, vec!["orders/updateOrder", "orders/createOrder", "user/updateProfile"]);
        assert_eq!(snapshot[1].retries_remaining, 2);
    }

    #[tokio::test]
    async fn test_exhausted_intent_is_reported_and_removed() {
        let manager = manager(1);
        let mut events = manager.events().subscribe();
        let session = SessionContext::new().with_user_id("u-1");
        manager
            .enqueue(
                IntentDescriptor::new("orders/createOrder", json!({ "orderId": 9 })).unwrap(),
                IntentPriority::High,
                &session,
            )
            .await
            .unwrap();

        let intent = manager.pop_next().await.unwrap();
        let report = manager.record_failure(intent).await.unwrap();

        assert_eq!(report.action_type, "orders/createOrder");
        assert_eq!(report.metadata.order_id.as_deref(), Some("9"));
        assert_eq!(report.metadata.user_id.as_deref(), Some("u-1"));
        assert!(manager.is_empty().await);

        assert!(matches!(events.recv().await.unwrap(), QueueEvent::Queued { .. }));
        assert_eq!(events.recv().await.unwrap(), QueueEvent::PermanentlyFailed(report));
    }

    #[tokio::test]
    async fn test_stats_by_tier() {
        let manager = manager(3);
        let session = SessionContext::new();
        manager.enqueue(descriptor("orders/createOrder"), IntentPriority::High, &session).await.unwrap();
        manager.enqueue(descriptor("menu/rateItem"), IntentPriority::Low, &session).await.unwrap();
        manager.enqueue(descriptor("menu/rateTruck"), IntentPriority::Low, &session).await.unwrap();

        let stats = manager.stats().await;
        assert_eq!(stats.total_intents, 3);
        assert_eq!((stats.high, stats.medium, stats.low), (1, 0, 2));
        assert!(stats.oldest_created_at.is_some());

        assert_eq!(manager.clear().await, 3);
        assert_eq!(manager.stats().await, QueueStats::default());
    }

    #[tokio::test]
    async fn test_attached_store_tracks_every_change() {
        let store = Arc::new(MemorySnapshotStore::new());
        let manager = manager(1);
        let session = SessionContext::new();

        assert_eq!(manager.attach_store(store.clone()).await.unwrap(), 0);
        manager.enqueue(descriptor("orders/createOrder"), IntentPriority::High, &session).await.unwrap();
        manager.enqueue(descriptor("menu/rateItem"), IntentPriority::Low, &session).await.unwrap();
        assert_eq!(store.load().await.unwrap().len(), 2);

        // 执行中的意图在有结果前仍留在快照中，期间的入队不会把它挤掉
        let first = manager.pop_next().await.unwrap();
        manager.enqueue(descriptor("orders/updateOrder"), IntentPriority::High, &session).await.unwrap();
        let saved = store.load().await.unwrap();
        assert_eq!(saved.len(), 3);
        assert_eq!(saved[0].id, first.id);
        manager.complete(&first).await;
        assert_eq!(store.load().await.unwrap().len(), 2);

        let second = manager.pop_next().await.unwrap();
        assert_eq!(second.action_type, "orders/updateOrder");
        assert!(manager.record_failure(second).await.is_some());
        let saved = store.load().await.unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].action_type, "menu/rateItem");
    }

    #[tokio::test]
    async fn test_restore_puts_persisted_intents_first() {
        let store = MemorySnapshotStore::new();
        let session = SessionContext::new();

        let before = manager(3);
        before.enqueue(descriptor("orders/createOrder"), IntentPriority::High, &session).await.unwrap();
        before.enqueue(descriptor("menu/rateItem"), IntentPriority::Low, &session).await.unwrap();
        assert_eq!(before.persist_to(&store).await.unwrap(), 2);

        let after = manager(3);
        after.enqueue(descriptor("orders/updateOrder"), IntentPriority::High, &session).await.unwrap();
        assert_eq!(after.restore_from(&store).await.unwrap(), 2);

        let mut sequences: Vec<u64> = after
            .snapshot()
            .await
            .iter()
            .map(|intent| intent.enqueued_at)
            .collect();
        sequences.sort_unstable();
        sequences.dedup();
        assert_eq!(sequences.len(), 3);

        assert_eq!(
            drain_types(&after).await,
            vec!["orders/createOrder", "orders/updateOrder", "menu/rateItem"]
        );
    }
}
