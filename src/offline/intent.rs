use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::context::SessionContext;
use crate::error::{Result, ServerError};

/// 意图优先级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentPriority {
    /// 低优先级 - 其他所有动作
    Low = 0,
    /// 中优先级 - 用户资料相关
    Medium = 1,
    /// 高优先级 - 订单相关
    High = 2,
}

impl IntentPriority {
    /// 回放顺序：高 → 中 → 低
    pub const DRAIN_ORDER: [IntentPriority; 3] =
        [IntentPriority::High, IntentPriority::Medium, IntentPriority::Low];

    pub fn as_str(&self) -> &'static str {
        match self {
            IntentPriority::High => "high",
            IntentPriority::Medium => "medium",
            IntentPriority::Low => "low",
        }
    }

    /// 在分层队列中的下标（与 DRAIN_ORDER 一致）
    pub(crate) fn tier_index(self) -> usize {
        match self {
            IntentPriority::High => 0,
            IntentPriority::Medium => 1,
            IntentPriority::Low => 2,
        }
    }
}

impl fmt::Display for IntentPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 宿主派发的原始意图
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentDescriptor {
    /// 动作类型，例如 "orders/createOrder"
    #[serde(alias = "type")]
    pub action_type: String,
    /// 不透明的负载
    #[serde(default)]
    pub payload: Value,
}

impl IntentDescriptor {
    /// 创建并校验意图
    pub fn new(action_type: impl Into<String>, payload: Value) -> Result<Self> {
        let descriptor = Self {
            action_type: action_type.into(),
            payload,
        };
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// 缺少 actionType 属于调用方编程错误，直接失败
    pub fn validate(&self) -> Result<()> {
        if self.action_type.trim().is_empty() {
            return Err(ServerError::Validation(
                "intent is missing actionType".to_string(),
            ));
        }
        Ok(())
    }
}

/// 关联元数据，队列本身不解释这些字段
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentMetadata {
    /// 关联订单ID
    pub order_id: Option<String>,
    /// 关联用户ID
    pub user_id: Option<String>,
}

impl IntentMetadata {
    /// 从负载和会话中提取关联字段，缺失字段保持为空
    pub fn collect(payload: &Value, session: &SessionContext) -> Self {
        let order_id = lookup_id(payload, &["orderId", "order_id"]);
        let user_id = session
            .user_id
            .clone()
            .or_else(|| lookup_id(payload, &["userId", "user_id"]));

        Self { order_id, user_id }
    }
}

fn lookup_id(payload: &Value, keys: &[&str]) -> Option<String> {
    let object = payload.as_object()?;
    keys.iter().find_map(|key| match object.get(*key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// 排队中的意图
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Intent {
    /// 意图唯一ID（仅用于关联）
    pub id: Uuid,
    /// 动作类型
    pub action_type: String,
    /// 负载
    pub payload: Value,
    /// 入队时确定的优先级
    pub priority: IntentPriority,
    /// 剩余重试次数
    pub retries_remaining: u32,
    /// 关联元数据
    pub metadata: IntentMetadata,
    /// 逻辑入队时间（单调递增序号）
    pub enqueued_at: u64,
    /// 实际入队时间
    pub created_at: DateTime<Utc>,
}

impl Intent {
    pub fn new(
        descriptor: IntentDescriptor,
        priority: IntentPriority,
        max_retries: u32,
        metadata: IntentMetadata,
        enqueued_at: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            action_type: descriptor.action_type,
            payload: descriptor.payload,
            priority,
            retries_remaining: max_retries,
            metadata,
            enqueued_at,
            created_at: Utc::now(),
        }
    }

    /// 记录一次失败的回放，返回是否还能重试
    pub fn record_failure(&mut self) -> bool {
        self.retries_remaining = self.retries_remaining.saturating_sub(1);
        self.retries_remaining > 0
    }
}

/// 入队确认中的标记
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedMeta {
    pub queued: bool,
    pub offline: bool,
}

/// 入队确认：原始意图加上 queued/offline 标记
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Acknowledgment {
    #[serde(flatten)]
    pub intent: IntentDescriptor,
    pub meta: QueuedMeta,
}

impl Acknowledgment {
    pub fn queued(intent: IntentDescriptor) -> Self {
        Self {
            intent,
            meta: QueuedMeta {
                queued: true,
                offline: true,
            },
        }
    }
}

/// 永久失败原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    RetriesExhausted,
}

/// 永久失败报告
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureReport {
    pub intent_id: Uuid,
    pub action_type: String,
    pub metadata: IntentMetadata,
    pub reason: FailureReason,
}

impl FailureReport {
    pub fn retries_exhausted(intent: &Intent) -> Self {
        Self {
            intent_id: intent.id,
            action_type: intent.action_type.clone(),
            metadata: intent.metadata.clone(),
            reason: FailureReason::RetriesExhausted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_descriptor_requires_action_type() {
        assert!(IntentDescriptor::new("orders/createOrder", json!({})).is_ok());

        let err = IntentDescriptor::new("  ", json!({})).unwrap_err();
        assert!(matches!(err, ServerError::Validation(_)));

        let missing: std::result::Result<IntentDescriptor, _> =
            serde_json::from_value(json!({ "payload": { "orderId": 1 } }));
        assert!(missing.is_err());
    }

    #[test]
    fn test_metadata_collection() {
        let session = SessionContext::new().with_user_id("u-42");
        let metadata = IntentMetadata::collect(&json!({ "orderId": 17, "userId": "other" }), &session);
        assert_eq!(metadata.order_id.as_deref(), Some("17"));
        assert_eq!(metadata.user_id.as_deref(), Some("u-42"));

        let anonymous = SessionContext::new();
        let metadata = IntentMetadata::collect(&json!({ "order_id": "ord-1", "user_id": "u-7" }), &anonymous);
        assert_eq!(metadata.order_id.as_deref(), Some("ord-1"));
        assert_eq!(metadata.user_id.as_deref(), Some("u-7"));

        let metadata = IntentMetadata::collect(&json!("not an object"), &anonymous);
        assert_eq!(metadata, IntentMetadata::default());
    }

    #[test]
    fn test_retry_countdown() {
        let descriptor = IntentDescriptor::new("orders/updateOrder", json!({})).unwrap();
        let mut intent = Intent::new(descriptor, IntentPriority::High, 2, IntentMetadata::default(), 1);

        assert!(intent.record_failure());
        assert_eq!(intent.retries_remaining, 1);
        assert!(!intent.record_failure());
        assert_eq!(intent.retries_remaining, 0);
        // 已经耗尽时不会下溢
        assert!(!intent.record_failure());
        assert_eq!(intent.retries_remaining, 0);
    }

    #[test]
    fn test_acknowledgment_shape() {
        let descriptor = IntentDescriptor::new("orders/createOrder", json!({ "orderId": "o1" })).unwrap();
        let ack = serde_json::to_value(Acknowledgment::queued(descriptor)).unwrap();
        assert_eq!(
            ack,
            json!({
                "actionType": "orders/createOrder",
                "payload": { "orderId": "o1" },
                "meta": { "queued": true, "offline": true }
            })
        );
    }

    #[test]
    fn test_failure_report_reason() {
        let descriptor = IntentDescriptor::new("orders/cancelOrder", json!({})).unwrap();
        let intent = Intent::new(descriptor, IntentPriority::High, 1, IntentMetadata::default(), 1);
        let report = serde_json::to_value(FailureReport::retries_exhausted(&intent)).unwrap();
        assert_eq!(report["reason"], "retries_exhausted");
        assert_eq!(report["actionType"], "orders/cancelOrder");
    }
}
