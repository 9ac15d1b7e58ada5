// 业务服务层模块
pub mod offline_queue_service;
pub mod simulation;

pub use offline_queue_service::OfflineQueueService;
