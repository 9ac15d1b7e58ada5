use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::context::SessionContext;
use crate::error::Result;
use crate::infra::{metrics, Connectivity};
use crate::offline::{
    Acknowledgment, ActionSink, ForwardReason, Gate, IntentDescriptor, OfflineQueueManager, Route,
};

/// 派发结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// 离线时已入队，等待恢复连接后回放
    Queued(Acknowledgment),
    /// 已直接交给执行端并执行成功
    Executed {
        action_type: String,
        reason: ForwardReason,
    },
}

impl DispatchOutcome {
    pub fn is_queued(&self) -> bool {
        matches!(self, DispatchOutcome::Queued(_))
    }
}

/// 意图分发器
///
/// 宿主状态层的单一派发入口：每次派发都重新读取连接状态，
/// 由门控决定入队还是直接执行。
pub struct OfflineDispatcher<S: ActionSink> {
    gate: Gate,
    manager: Arc<OfflineQueueManager>,
    sink: Arc<S>,
    connectivity: Connectivity,
}

impl<S: ActionSink> OfflineDispatcher<S> {
    pub fn new(
        gate: Gate,
        manager: Arc<OfflineQueueManager>,
        sink: Arc<S>,
        connectivity: Connectivity,
    ) -> Self {
        Self {
            gate,
            manager,
            sink,
            connectivity,
        }
    }

    pub fn gate(&self) -> &Gate {
        &self.gate
    }

    /// 派发一个意图
    ///
    /// 直接执行时执行端的错误原样返回；入队永远不会因执行端失败而报错。
    pub async fn dispatch(
        &self,
        descriptor: IntentDescriptor,
        session: &SessionContext,
    ) -> Result<DispatchOutcome> {
        descriptor.validate()?;

        let online = self.connectivity.is_online();
        match self.gate.route(&descriptor.action_type, online) {
            Route::Enqueue(priority) => {
                let ack = self.manager.enqueue(descriptor, priority, session).await?;
                Ok(DispatchOutcome::Queued(ack))
            }
            Route::Forward(reason) => {
                debug!("Forwarding {} ({:?})", descriptor.action_type, reason);
                metrics::record_forwarded(forward_label(reason));
                self.sink
                    .execute(&descriptor.action_type, &descriptor.payload)
                    .await?;
                Ok(DispatchOutcome::Executed {
                    action_type: descriptor.action_type,
                    reason,
                })
            }
        }
    }
}

fn forward_label(reason: ForwardReason) -> &'static str {
    match reason {
        ForwardReason::AlwaysOnline => "always_online",
        ForwardReason::Online => "online",
        ForwardReason::Unmanaged => "unmanaged",
    }
}
