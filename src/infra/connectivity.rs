use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

/// 连接状态观察者
///
/// 状态由外部（网络监听）持有并更新，队列只在决策时读取当前值。
/// 克隆出来的句柄共享同一个状态。
#[derive(Debug, Clone)]
pub struct Connectivity {
    sender: Arc<watch::Sender<bool>>,
}

impl Connectivity {
    pub fn new(online: bool) -> Self {
        let (sender, _) = watch::channel(online);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn online() -> Self {
        Self::new(true)
    }

    pub fn offline() -> Self {
        Self::new(false)
    }

    /// 读取当前连接状态
    pub fn is_online(&self) -> bool {
        *self.sender.borrow()
    }

    /// 更新连接状态，返回状态是否真的发生了变化
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.sender.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });

        if changed {
            info!("Connectivity changed: {}", if online { "online" } else { "offline" });
        }
        changed
    }

    /// 订阅状态变化
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::online()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let connectivity = Connectivity::offline();
        let observer = connectivity.clone();

        assert!(!observer.is_online());
        assert!(connectivity.set_online(true));
        assert!(observer.is_online());
        assert!(!connectivity.set_online(true));
    }

    #[tokio::test]
    async fn test_subscribers_see_transitions() {
        let connectivity = Connectivity::offline();
        let mut rx = connectivity.subscribe();

        connectivity.set_online(true);
        rx.changed().await.unwrap();
        assert!(*rx.borrow_and_update());
    }
}
