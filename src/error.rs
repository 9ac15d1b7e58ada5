use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 离线队列错误类型
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum ServerError {
    /// 内部错误
    #[error("Internal error: {0}")]
    Internal(String),
    /// 验证错误（例如缺少 actionType 的意图）
    #[error("Validation error: {0}")]
    Validation(String),
    /// 配置错误
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// 序列化错误
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// 存储错误
    #[error("Storage error: {0}")]
    Storage(String),
    /// 网络错误
    #[error("Network error: {0}")]
    Network(String),
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        ServerError::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for ServerError {
    fn from(err: serde_json::Error) -> Self {
        ServerError::Serialization(err.to_string())
    }
}

impl From<sled::Error> for ServerError {
    fn from(err: sled::Error) -> Self {
        ServerError::Storage(err.to_string())
    }
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ServerError::Validation("actionType is required".to_string());
        assert_eq!(err.to_string(), "Validation error: actionType is required");
    }

    #[test]
    fn test_json_error_conversion() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{");
        let err: ServerError = parse.unwrap_err().into();
        assert!(matches!(err, ServerError::Serialization(_)));
    }
}
