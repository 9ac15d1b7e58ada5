use serde::{Deserialize, Serialize};

use super::intent::IntentPriority;

/// 优先级标记
///
/// 按子串匹配 actionType：先检查高优先级标记，再检查中优先级标记，
/// 都不命中时为低优先级。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityMarkers {
    /// 订单类标记
    #[serde(default = "default_high_markers")]
    pub high: Vec<String>,
    /// 用户类标记
    #[serde(default = "default_medium_markers")]
    pub medium: Vec<String>,
}

fn default_high_markers() -> Vec<String> {
    vec!["order".to_string()]
}

fn default_medium_markers() -> Vec<String> {
    vec!["user".to_string()]
}

impl Default for PriorityMarkers {
    fn default() -> Self {
        Self {
            high: default_high_markers(),
            medium: default_medium_markers(),
        }
    }
}

impl PriorityMarkers {
    pub fn classify(&self, action_type: &str) -> IntentPriority {
        if Self::matches(&self.high, action_type) {
            IntentPriority::High
        } else if Self::matches(&self.medium, action_type) {
            IntentPriority::Medium
        } else {
            IntentPriority::Low
        }
    }

    fn matches(markers: &[String], action_type: &str) -> bool {
        // 空标记会匹配所有类型，忽略
        markers
            .iter()
            .any(|marker| !marker.is_empty() && action_type.contains(marker.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_markers() {
        let markers = PriorityMarkers::default();
        assert_eq!(markers.classify("orders/createOrder"), IntentPriority::High);
        assert_eq!(markers.classify("user/updateProfile"), IntentPriority::Medium);
        assert_eq!(markers.classify("menu/rateItem"), IntentPriority::Low);
    }

    #[test]
    fn test_order_marker_wins_over_user_marker() {
        let markers = PriorityMarkers::default();
        assert_eq!(markers.classify("user/reorderFavorites"), IntentPriority::High);
        assert_eq!(markers.classify("orders/assignUser"), IntentPriority::High);
    }

    #[test]
    fn test_matching_is_case_sensitive_and_stable() {
        let markers = PriorityMarkers::default();
        assert_eq!(markers.classify("Orders/Create"), IntentPriority::Low);
        for _ in 0..3 {
            assert_eq!(markers.classify("orders/createOrder"), IntentPriority::High);
        }
    }

    #[test]
    fn test_custom_markers_ignore_empty_entries() {
        let markers = PriorityMarkers {
            high: vec![String::new(), "payment".to_string()],
            medium: vec!["review".to_string()],
        };
        assert_eq!(markers.classify("payments/capture"), IntentPriority::High);
        assert_eq!(markers.classify("reviews/submit"), IntentPriority::Medium);
        assert_eq!(markers.classify("orders/createOrder"), IntentPriority::Low);
    }
}
