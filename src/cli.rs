use clap::{Parser, Subcommand};

impl Cli {
    /// 解析命令行参数
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}

/// FoodTruck Offline - 离线动作队列与回放
#[derive(Parser, Debug, Default)]
#[command(name = "foodtruck-offline")]
#[command(version)]
#[command(about = "离线时拦截状态变更意图，恢复连接后按优先级回放", long_about = None)]
pub struct Cli {
    /// 配置文件路径
    #[arg(long, value_name = "FILE", help = "指定配置文件路径")]
    pub config_file: Option<String>,

    /// 日志级别
    #[arg(
        long,
        value_name = "LEVEL",
        help = "日志级别: trace, debug, info, warn, error"
    )]
    pub log_level: Option<String>,

    /// 日志格式
    #[arg(long, value_name = "FORMAT", help = "日志格式: pretty, json, compact")]
    pub log_format: Option<String>,

    /// 日志文件路径
    #[arg(long, value_name = "PATH", help = "日志输出文件路径")]
    pub log_file: Option<String>,

    /// 最大重试次数
    #[arg(long, value_name = "NUM", help = "每个意图的最大回放次数")]
    pub max_retries: Option<u32>,

    /// 队列快照目录（指定即启用持久化）
    #[arg(long, value_name = "PATH", help = "sled 快照目录，指定后启用持久化")]
    pub persistence_path: Option<String>,

    /// 详细输出（可重复使用：-v, -vv, -vvv）
    #[arg(short, action = clap::ArgAction::Count, help = "详细输出级别")]
    pub verbose: u8,

    /// 静默模式
    #[arg(long, short = 'q', help = "静默模式（只输出错误）")]
    pub quiet: bool,

    /// 开发模式（等同于 --log-level debug --log-format pretty）
    #[arg(long, help = "启用开发模式")]
    pub dev: bool,

    /// 子命令
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// 生成默认配置文件
    GenerateConfig {
        /// 输出文件路径
        #[arg(value_name = "PATH", default_value = crate::config::DEFAULT_CONFIG_FILE)]
        path: String,
    },
    /// 验证配置文件
    ValidateConfig {
        /// 配置文件路径
        #[arg(value_name = "PATH", default_value = crate::config::DEFAULT_CONFIG_FILE)]
        path: String,
    },
    /// 显示最终配置（合并后的配置）
    ShowConfig,
    /// 查看某个动作类型在给定连接状态下的路由结果
    Classify {
        /// 动作类型，例如 orders/createOrder
        #[arg(value_name = "ACTION_TYPE")]
        action_type: String,
        /// 按离线状态判断（默认在线）
        #[arg(long)]
        offline: bool,
    },
    /// 执行一个 JSON 脚本：切换连接状态、派发意图，并打印回放结果
    Simulate {
        /// 脚本文件路径
        #[arg(value_name = "SCRIPT")]
        script: String,
        /// 执行时总是失败的动作类型（可重复）
        #[arg(long = "fail", value_name = "ACTION_TYPE")]
        fail: Vec<String>,
    },
    /// 从快照恢复队列，以在线状态回放到日志执行端，剩余意图写回快照
    Replay {
        /// 执行时总是失败的动作类型（可重复）
        #[arg(long = "fail", value_name = "ACTION_TYPE")]
        fail: Vec<String>,
    },
}

impl Cli {
    /// 获取日志级别（考虑 verbose 和 quiet）
    pub fn get_log_level(&self) -> Option<String> {
        if self.quiet {
            return Some("error".to_string());
        }

        if self.dev {
            return Some("debug".to_string());
        }

        if let Some(level) = &self.log_level {
            return Some(level.clone());
        }

        match self.verbose {
            0 => None,
            1 => Some("info".to_string()),
            2 => Some("debug".to_string()),
            _ => Some("trace".to_string()),
        }
    }

    /// 获取日志格式
    pub fn get_log_format(&self) -> Option<String> {
        if self.dev {
            return Some("pretty".to_string());
        }
        self.log_format.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quiet_wins_over_verbose() {
        let cli = Cli::try_parse_from(["foodtruck-offline", "-vvv", "-q"]).unwrap();
        assert_eq!(cli.get_log_level().as_deref(), Some("error"));
    }

    #[test]
    fn test_verbose_levels() {
        let cli = Cli::try_parse_from(["foodtruck-offline", "-vv"]).unwrap();
        assert_eq!(cli.get_log_level().as_deref(), Some("debug"));

        let cli = Cli::try_parse_from(["foodtruck-offline"]).unwrap();
        assert_eq!(cli.get_log_level(), None);
    }

    #[test]
    fn test_simulate_subcommand() {
        let cli = Cli::try_parse_from([
            "foodtruck-offline",
            "--max-retries",
            "2",
            "simulate",
            "script.json",
            "--fail",
            "orders/createOrder",
        ])
        .unwrap();

        assert_eq!(cli.max_retries, Some(2));
        match cli.command {
            Some(Commands::Simulate { script, fail }) => {
                assert_eq!(script, "script.json");
                assert_eq!(fail, vec!["orders/createOrder"]);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_replay_subcommand() {
        let cli = Cli::try_parse_from([
            "foodtruck-offline",
            "--persistence-path",
            "./data/queue",
            "replay",
        ])
        .unwrap();

        assert_eq!(cli.persistence_path.as_deref(), Some("./data/queue"));
        assert!(matches!(cli.command, Some(Commands::Replay { ref fail }) if fail.is_empty()));
    }

    #[test]
    fn test_no_subcommand_parses_to_none() {
        let cli = Cli::try_parse_from(["foodtruck-offline", "-v"]).unwrap();
        assert!(cli.command.is_none());
    }
}
