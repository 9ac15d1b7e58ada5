use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::OfflineQueueService;
use crate::context::SessionContext;
use crate::dispatcher::DispatchOutcome;
use crate::error::Result;
use crate::offline::{ActionSink, IntentDescriptor, ReplayReport};

/// 脚本中的一步
///
/// ```json
/// [
///   { "online": false },
///   { "dispatch": { "type": "orders/createOrder", "payload": { "orderId": "o-1" } }, "userId": "u-1" },
///   { "online": true }
/// ]
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum SimulationStep {
    /// 切换连接状态；切到在线时立即回放一次
    Connectivity { online: bool },
    /// 派发一个意图
    Dispatch {
        dispatch: IntentDescriptor,
        #[serde(default, rename = "userId")]
        user_id: Option<String>,
    },
}

/// 每一步的结果
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum StepOutcome {
    Connectivity {
        online: bool,
        replay: Option<ReplayReport>,
    },
    Dispatched(DispatchOutcome),
    Rejected {
        action_type: String,
        error: String,
    },
}

/// 读取脚本文件
pub fn load_script<P: AsRef<Path>>(path: P) -> Result<Vec<SimulationStep>> {
    let content = fs::read_to_string(path.as_ref())?;
    let steps: Vec<SimulationStep> = serde_json::from_str(&content)?;
    debug!("Loaded {} simulation steps from {:?}", steps.len(), path.as_ref());
    Ok(steps)
}

/// 逐步执行脚本
///
/// 不依赖同步 Worker：切到在线后直接回放，结果写在该步的输出里。
pub async fn run_script<S: ActionSink>(
    service: &OfflineQueueService<S>,
    steps: Vec<SimulationStep>,
) -> Vec<StepOutcome> {
    let mut outcomes = Vec::with_capacity(steps.len());

    for step in steps {
        let outcome = match step {
            SimulationStep::Connectivity { online } => {
                service.connectivity().set_online(online);
                let replay = if online {
                    Some(service.replay_now().await)
                } else {
                    None
                };
                StepOutcome::Connectivity { online, replay }
            }
            SimulationStep::Dispatch { dispatch, user_id } => {
                let mut session = SessionContext::new();
                if let Some(user_id) = user_id {
                    session = session.with_user_id(user_id);
                }
                let action_type = dispatch.action_type.clone();
                match service.dispatch(dispatch, &session).await {
                    Ok(outcome) => StepOutcome::Dispatched(outcome),
                    Err(e) => StepOutcome::Rejected {
                        action_type,
                        error: e.to_string(),
                    },
                }
            }
        };
        outcomes.push(outcome);
    }

    info!(
        "Simulation finished: {} steps, {} intents still queued",
        outcomes.len(),
        service.manager().len().await
    );
    outcomes
}
