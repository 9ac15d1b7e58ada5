pub mod cli;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod domain;
pub mod error;
pub mod infra;
pub mod logging;
pub mod offline;
pub mod service;

pub use config::{AppConfig, OfflineConfig};
pub use context::SessionContext;
pub use dispatcher::{DispatchOutcome, OfflineDispatcher};
pub use domain::QueueEvent;
pub use error::{Result, ServerError};
pub use infra::{Connectivity, EventBus, OfflineSyncWorker};
pub use offline::{
    Acknowledgment, ActionSink, FailureReport, Gate, Intent, IntentDescriptor, IntentPriority,
    OfflineQueueManager, ReplayDriver, ReplayReport, Route,
};
pub use service::OfflineQueueService;
