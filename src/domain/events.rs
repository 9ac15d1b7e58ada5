use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::offline::{FailureReport, IntentPriority};

/// 离线队列事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueueEvent {
    /// 离线时意图已入队
    Queued {
        intent_id: Uuid,
        action_type: String,
        priority: IntentPriority,
        depth: usize,
    },

    /// 回放成功
    Replayed {
        intent_id: Uuid,
        action_type: String,
    },

    /// 回放失败，已放回所在优先级的队尾
    Retrying {
        intent_id: Uuid,
        action_type: String,
        retries_remaining: u32,
    },

    /// 重试耗尽，已移出队列
    PermanentlyFailed(FailureReport),

    /// 回放中途断网，剩余意图保持原样
    ReplayHalted { remaining: usize },
}

impl QueueEvent {
    pub fn name(&self) -> &'static str {
        match self {
            QueueEvent::Queued { .. } => "queued",
            QueueEvent::Replayed { .. } => "replayed",
            QueueEvent::Retrying { .. } => "retrying",
            QueueEvent::PermanentlyFailed(_) => "permanently_failed",
            QueueEvent::ReplayHalted { .. } => "replay_halted",
        }
    }
}
