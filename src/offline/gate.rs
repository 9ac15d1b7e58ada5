use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::intent::IntentPriority;
use super::priority::PriorityMarkers;
use crate::config::OfflineConfig;

/// 直接转发的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForwardReason {
    /// 豁免类型（连接状态更新、队列自身的同步动作等），永不排队
    AlwaysOnline,
    /// 当前在线
    Online,
    /// 离线但不是可排队类型，由动作自行处理离线
    Unmanaged,
}

/// 路由决策
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    /// 立即交给执行端
    Forward(ForwardReason),
    /// 放入离线队列
    Enqueue(IntentPriority),
}

/// 离线门控
///
/// 纯函数：只依赖 (actionType, 当前连接状态, 配置的集合)。
#[derive(Debug, Clone)]
pub struct Gate {
    always_online: HashSet<String>,
    queueable: HashSet<String>,
    markers: PriorityMarkers,
}

impl Gate {
    pub fn new(
        always_online: impl IntoIterator<Item = String>,
        queueable: impl IntoIterator<Item = String>,
        markers: PriorityMarkers,
    ) -> Self {
        Self {
            always_online: always_online.into_iter().collect(),
            queueable: queueable.into_iter().collect(),
            markers,
        }
    }

    pub fn from_config(config: &OfflineConfig) -> Self {
        Self::new(
            config.always_online_action_types.iter().cloned(),
            config.queueable_action_types.iter().cloned(),
            config.priority_markers.clone(),
        )
    }

    pub fn route(&self, action_type: &str, online: bool) -> Route {
        if self.always_online.contains(action_type) {
            return Route::Forward(ForwardReason::AlwaysOnline);
        }
        if online {
            return Route::Forward(ForwardReason::Online);
        }
        if self.queueable.contains(action_type) {
            return Route::Enqueue(self.markers.classify(action_type));
        }
        Route::Forward(ForwardReason::Unmanaged)
    }

    pub fn priority_of(&self, action_type: &str) -> IntentPriority {
        self.markers.classify(action_type)
    }

    pub fn is_queueable(&self, action_type: &str) -> bool {
        self.queueable.contains(action_type) && !self.always_online.contains(action_type)
    }
}
