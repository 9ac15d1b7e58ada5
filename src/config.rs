use std::env;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::offline::PriorityMarkers;

/// 默认配置文件名
pub const DEFAULT_CONFIG_FILE: &str = "foodtruck-offline.toml";

/// 环境变量前缀
const ENV_PREFIX: &str = "FOODTRUCK_";

/// 应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// 离线队列配置
    pub offline: OfflineConfig,
    /// 队列快照持久化配置
    pub persistence: PersistenceConfig,
    /// 日志配置
    pub logging: LoggingConfig,
}

/// 离线队列配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfflineConfig {
    /// 离线时需要排队的动作类型
    pub queueable_action_types: Vec<String>,
    /// 永不排队的动作类型（连接状态更新、队列自身的控制动作）
    pub always_online_action_types: Vec<String>,
    /// 每个意图的最大重试次数
    pub max_retries: u32,
    /// 优先级标记
    pub priority_markers: PriorityMarkers,
    /// 事件总线容量
    pub event_bus_capacity: usize,
}

impl Default for OfflineConfig {
    fn default() -> Self {
        Self {
            queueable_action_types: vec![
                "orders/createOrder".to_string(),
                "orders/updateOrder".to_string(),
                "orders/cancelOrder".to_string(),
                "user/updateProfile".to_string(),
                "user/updateFavorites".to_string(),
            ],
            always_online_action_types: vec![
                "network/setConnectivity".to_string(),
                "offline/syncQueue".to_string(),
                "offline/queueAction".to_string(),
                "offline/removeFromQueue".to_string(),
            ],
            max_retries: 3,
            priority_markers: PriorityMarkers::default(),
            event_bus_capacity: 1000,
        }
    }
}

impl OfflineConfig {
    /// 校验配置
    pub fn validate(&self) -> Result<()> {
        if self.max_retries == 0 {
            bail!("offline.max_retries must be at least 1");
        }
        if self.event_bus_capacity == 0 {
            bail!("offline.event_bus_capacity must be at least 1");
        }
        if let Some(empty) = self
            .queueable_action_types
            .iter()
            .chain(&self.always_online_action_types)
            .find(|action_type| action_type.trim().is_empty())
        {
            bail!("empty action type in configuration: {:?}", empty);
        }
        if self
            .priority_markers
            .high
            .iter()
            .chain(&self.priority_markers.medium)
            .any(|marker| marker.is_empty())
        {
            bail!("priority markers must not be empty strings");
        }

        for action_type in &self.queueable_action_types {
            if self.always_online_action_types.contains(action_type) {
                warn!(
                    "{} is both queueable and always-online; it will never be queued",
                    action_type
                );
            }
        }
        Ok(())
    }
}

/// 队列快照持久化配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// 是否启用
    pub enabled: bool,
    /// sled 数据目录
    pub path: String,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: "./data/offline-queue".to_string(),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别
    pub level: String,
    /// 日志格式：compact / pretty / json
    pub format: Option<String>,
    /// 日志文件路径
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: None,
            file: None,
        }
    }
}

impl AppConfig {
    /// 创建默认配置
    pub fn new() -> Self {
        Self::default()
    }

    /// 从 TOML 文件加载配置
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("无法读取配置文件: {:?}", path.as_ref()))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let toml_config: TomlConfig = toml::from_str(content).context("配置文件格式错误")?;
        Ok(toml_config.into())
    }

    /// 从环境变量加载配置（FOODTRUCK_ 前缀）
    pub fn merge_from_env(&mut self) -> Result<()> {
        self.merge_from_vars(|key| env::var(key).ok())
    }

    /// 从任意键值来源合并，键为去掉前缀前的完整变量名
    pub fn merge_from_vars<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

        if let Some(max_retries) = var("MAX_RETRIES") {
            self.offline.max_retries = max_retries
                .parse()
                .with_context(|| format!("FOODTRUCK_MAX_RETRIES 不是合法整数: {}", max_retries))?;
        }
        if let Some(list) = var("QUEUEABLE_ACTIONS") {
            self.offline.queueable_action_types = split_list(&list);
        }
        if let Some(list) = var("ALWAYS_ONLINE_ACTIONS") {
            self.offline.always_online_action_types = split_list(&list);
        }
        if let Some(list) = var("HIGH_PRIORITY_MARKERS") {
            self.offline.priority_markers.high = split_list(&list);
        }
        if let Some(list) = var("MEDIUM_PRIORITY_MARKERS") {
            self.offline.priority_markers.medium = split_list(&list);
        }
        if let Some(enabled) = var("PERSISTENCE_ENABLED") {
            self.persistence.enabled = parse_bool(&enabled)
                .with_context(|| format!("FOODTRUCK_PERSISTENCE_ENABLED 不是合法布尔值: {}", enabled))?;
        }
        if let Some(path) = var("PERSISTENCE_PATH") {
            self.persistence.path = path;
        }
        if let Some(level) = var("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = var("LOG_FORMAT") {
            self.logging.format = Some(format);
        }
        if let Some(file) = var("LOG_FILE") {
            self.logging.file = Some(file);
        }
        Ok(())
    }

    /// 从命令行参数合并配置
    pub fn merge_from_cli(&mut self, cli: &crate::cli::Cli) {
        if let Some(max_retries) = cli.max_retries {
            self.offline.max_retries = max_retries;
        }
        if let Some(path) = &cli.persistence_path {
            self.persistence.enabled = true;
            self.persistence.path = path.clone();
        }
        if let Some(log_level) = cli.get_log_level() {
            self.logging.level = log_level;
        }
        if let Some(log_format) = cli.get_log_format() {
            self.logging.format = Some(log_format);
        }
        if let Some(log_file) = &cli.log_file {
            self.logging.file = Some(log_file.clone());
        }
    }

    /// 加载配置（按优先级：命令行 > 环境变量 > 配置文件 > 默认值）
    pub fn load(cli: &crate::cli::Cli) -> Result<Self> {
        // 1. 从配置文件加载（如果指定），否则尝试默认文件
        let mut config = match &cli.config_file {
            Some(config_file) if Path::new(config_file).exists() => {
                info!("Loading configuration from {}", config_file);
                Self::from_toml_file(config_file)?
            }
            Some(config_file) => {
                warn!("Configuration file not found: {}", config_file);
                Self::new()
            }
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                info!("Loading configuration from {}", DEFAULT_CONFIG_FILE);
                Self::from_toml_file(DEFAULT_CONFIG_FILE)?
            }
            None => Self::new(),
        };

        // 2. 从环境变量合并
        config.merge_from_env()?;

        // 3. 从命令行参数合并（最高优先级）
        config.merge_from_cli(cli);

        config.offline.validate()?;
        Ok(config)
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("unrecognised boolean: {}", other),
    }
}

/// 只读取配置文件中的 [logging] 段，用于在加载完整配置前初始化日志
pub fn load_early_logging_config(config_file: Option<&str>) -> TomlLoggingConfig {
    let path = config_file.unwrap_or(DEFAULT_CONFIG_FILE);
    fs::read_to_string(path)
        .ok()
        .and_then(|content| toml::from_str::<TomlConfig>(&content).ok())
        .and_then(|config| config.logging)
        .unwrap_or_default()
}

/// TOML 配置文件结构（用于反序列化）
#[derive(Debug, Deserialize)]
struct TomlConfig {
    offline: Option<TomlOfflineConfig>,
    persistence: Option<TomlPersistenceConfig>,
    logging: Option<TomlLoggingConfig>,
}

#[derive(Debug, Deserialize)]
struct TomlOfflineConfig {
    queueable_action_types: Option<Vec<String>>,
    always_online_action_types: Option<Vec<String>>,
    max_retries: Option<u32>,
    priority_markers: Option<PriorityMarkers>,
    event_bus_capacity: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct TomlPersistenceConfig {
    enabled: Option<bool>,
    path: Option<String>,
}

/// [logging] 段
#[derive(Debug, Default, Deserialize)]
pub struct TomlLoggingConfig {
    pub level: Option<String>,
    pub format: Option<String>,
    pub file: Option<String>,
}

impl From<TomlConfig> for AppConfig {
    fn from(toml: TomlConfig) -> Self {
        let mut config = Self::default();

        if let Some(offline) = toml.offline {
            if let Some(types) = offline.queueable_action_types {
                config.offline.queueable_action_types = types;
            }
            if let Some(types) = offline.always_online_action_types {
                config.offline.always_online_action_types = types;
            }
            if let Some(max_retries) = offline.max_retries {
                config.offline.max_retries = max_retries;
            }
            if let Some(markers) = offline.priority_markers {
                config.offline.priority_markers = markers;
            }
            if let Some(capacity) = offline.event_bus_capacity {
                config.offline.event_bus_capacity = capacity;
            }
        }

        if let Some(persistence) = toml.persistence {
            if let Some(enabled) = persistence.enabled {
                config.persistence.enabled = enabled;
            }
            if let Some(path) = persistence.path {
                config.persistence.path = path;
            }
        }

        if let Some(logging) = toml.logging {
            if let Some(level) = logging.level {
                config.logging.level = level;
            }
            config.logging.format = logging.format.or(config.logging.format);
            config.logging.file = logging.file.or(config.logging.file);
        }

        config
    }
}
