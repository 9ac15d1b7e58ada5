use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::intent::Intent;
use crate::error::{Result, ServerError};

/// 队列快照存储 Trait
///
/// 快照按回放顺序保存整个队列；跨进程重启保留队列是可选能力，
/// 由宿主决定是否启用。
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// 覆盖保存快照
    async fn save(&self, intents: &[Intent]) -> Result<()>;

    /// 读取快照（按保存时的顺序）
    async fn load(&self) -> Result<Vec<Intent>>;

    /// 删除快照，返回删除的条目数
    async fn clear(&self) -> Result<usize>;
}

/// 内存快照存储（用于测试和开发）
#[derive(Default)]
pub struct MemorySnapshotStore {
    intents: RwLock<Vec<Intent>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn save(&self, intents: &[Intent]) -> Result<()> {
        *self.intents.write().await = intents.to_vec();
        Ok(())
    }

    async fn load(&self) -> Result<Vec<Intent>> {
        Ok(self.intents.read().await.clone())
    }

    async fn clear(&self) -> Result<usize> {
        let mut intents = self.intents.write().await;
        let removed = intents.len();
        intents.clear();
        Ok(removed)
    }
}

/// Sled 快照存储
///
/// 键为大端序的位置序号，值为 JSON 编码的意图（负载是任意 JSON，
/// 不能用 bincode 这类非自描述格式）。
pub struct SledSnapshotStore {
    tree: sled::Tree,
    path: String,
}

impl SledSnapshotStore {
    const TREE_NAME: &'static str = "offline_queue";

    pub fn open(path: &str) -> Result<Self> {
        let db = sled::open(path)
            .map_err(|e| ServerError::Storage(format!("Failed to open sled database: {}", e)))?;
        let tree = db.open_tree(Self::TREE_NAME)?;

        info!("Opened sled snapshot store at: {}", path);

        Ok(Self {
            tree,
            path: path.to_string(),
        })
    }

    fn position_key(position: usize) -> [u8; 8] {
        (position as u64).to_be_bytes()
    }
}

#[async_trait]
impl SnapshotStore for SledSnapshotStore {
    async fn save(&self, intents: &[Intent]) -> Result<()> {
        let mut batch = sled::Batch::default();
        for key in self.tree.iter().keys() {
            batch.remove(key?);
        }
        for (position, intent) in intents.iter().enumerate() {
            batch.insert(Self::position_key(position).to_vec(), serde_json::to_vec(intent)?);
        }

        self.tree.apply_batch(batch)?;
        self.tree.flush_async().await?;

        debug!("Saved {} intents to sled at {}", intents.len(), self.path);
        Ok(())
    }

    async fn load(&self) -> Result<Vec<Intent>> {
        let mut intents = Vec::new();
        for entry in self.tree.iter() {
            let (_key, value) = entry?;
            intents.push(serde_json::from_slice(&value)?);
        }

        debug!("Loaded {} intents from sled at {}", intents.len(), self.path);
        Ok(intents)
    }

    async fn clear(&self) -> Result<usize> {
        let removed = self.tree.len();
        self.tree.clear()?;
        self.tree.flush_async().await?;
        Ok(removed)
    }
}
