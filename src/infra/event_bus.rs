use tokio::sync::broadcast;
use tracing::trace;

use crate::domain::events::QueueEvent;

/// 进程内事件总线
///
/// 基于 tokio::sync::broadcast；没有订阅者时事件直接丢弃。
pub struct EventBus {
    sender: broadcast::Sender<QueueEvent>,
}

impl EventBus {
    /// 创建新的事件总线
    pub fn new() -> Self {
        Self::with_capacity(1000)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// 发布事件，返回收到事件的订阅者数量
    pub fn publish(&self, event: QueueEvent) -> usize {
        let name = event.name();
        match self.sender.send(event) {
            Ok(receivers) => receivers,
            Err(_) => {
                trace!("No subscribers for queue event {}", name);
                0
            }
        }
    }

    /// 订阅事件
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_without_subscribers_is_not_an_error() {
        let bus = EventBus::new();
        assert_eq!(bus.publish(QueueEvent::ReplayHalted { remaining: 2 }), 0);
    }

    #[tokio::test]
    async fn test_subscriber_receives_events_in_order() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.publish(QueueEvent::ReplayHalted { remaining: 2 });
        bus.publish(QueueEvent::ReplayHalted { remaining: 1 });

        assert_eq!(rx.recv().await.unwrap(), QueueEvent::ReplayHalted { remaining: 2 });
        assert_eq!(rx.recv().await.unwrap(), QueueEvent::ReplayHalted { remaining: 1 });
    }
}
