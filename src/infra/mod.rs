// Infrastructure layer - 基础设施层
// 负责连接状态、事件总线、指标和后台同步

pub mod connectivity;
pub mod event_bus;
pub mod metrics;
pub mod sync_worker;

// 重新导出主要类型
pub use connectivity::Connectivity;
pub use event_bus::EventBus;
pub use sync_worker::OfflineSyncWorker;
