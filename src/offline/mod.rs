// 离线意图队列模块
// 负责离线时拦截可排队的状态变更意图，并在恢复连接后按优先级回放

pub mod gate;
pub mod intent;
pub mod priority;
pub mod queue;
pub mod replay;
pub mod storage;

// 重新导出主要类型
pub use gate::{ForwardReason, Gate, Route};
pub use intent::{
    Acknowledgment, FailureReason, FailureReport, Intent, IntentDescriptor, IntentMetadata,
    IntentPriority, QueuedMeta,
};
pub use priority::PriorityMarkers;
pub use queue::{OfflineQueue, OfflineQueueManager, QueueStats};
pub use replay::{ActionSink, LogActionSink, ReplayDriver, ReplayReport, ReplayStats};
pub use storage::{MemorySnapshotStore, SledSnapshotStore, SnapshotStore};
