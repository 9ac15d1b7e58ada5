//! 离线队列指标：入队量、回放量、重试量、永久失败量与队列深度
//!
//! 只通过 `metrics` 门面记录；是否安装 Recorder（Prometheus 等）由宿主决定，
//! 未安装时所有调用都是空操作。

const COUNTER_QUEUED: &str = "foodtruck_offline_queued_total";
const COUNTER_REPLAYED: &str = "foodtruck_offline_replayed_total";
const COUNTER_RETRIED: &str = "foodtruck_offline_retried_total";
const COUNTER_FAILED: &str = "foodtruck_offline_failed_total";
const COUNTER_FORWARDED: &str = "foodtruck_offline_forwarded_total";
const GAUGE_QUEUE_DEPTH: &str = "foodtruck_offline_queue_depth";

/// 记录一次入队
pub fn record_queued(priority: &'static str) {
    metrics::counter!(COUNTER_QUEUED, "priority" => priority).increment(1);
}

/// 记录一次回放成功
pub fn record_replayed() {
    metrics::counter!(COUNTER_REPLAYED).increment(1);
}

/// 记录一次回放失败后的重试
pub fn record_retried() {
    metrics::counter!(COUNTER_RETRIED).increment(1);
}

/// 记录一次重试耗尽
pub fn record_failed() {
    metrics::counter!(COUNTER_FAILED).increment(1);
}

/// 记录一次不经过队列的直接转发
pub fn record_forwarded(reason: &'static str) {
    metrics::counter!(COUNTER_FORWARDED, "reason" => reason).increment(1);
}

/// 更新队列深度
pub fn record_queue_depth(depth: usize) {
    metrics::gauge!(GAUGE_QUEUE_DEPTH).set(depth as f64);
}
