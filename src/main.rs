use anyhow::{Context, Result};
use clap::CommandFactory;
use foodtruck_offline::{
    cli::{Cli, Commands},
    config::{self, AppConfig},
    infra::Connectivity,
    logging,
    offline::{Gate, LogActionSink, Route},
    service::{simulation, OfflineQueueService},
};
use std::fs;
use std::process;

#[tokio::main]
async fn main() -> Result<()> {
    // 加载 .env 文件（如果存在）
    let _ = dotenvy::dotenv();

    // 解析命令行参数
    let cli = Cli::parse();

    // 处理不需要日志的子命令
    match &cli.command {
        Some(Commands::GenerateConfig { path }) => return generate_config(path),
        Some(Commands::ValidateConfig { path }) => return validate_config(path),
        Some(Commands::ShowConfig) => return show_config(&cli),
        _ => {}
    }

    // 快速读取配置文件的 [logging] 段（不加载完整配置）
    let early_log = config::load_early_logging_config(cli.config_file.as_deref());

    // 合并日志配置（优先级：CLI > 配置文件 > 默认值）
    let log_level = cli
        .get_log_level()
        .or(early_log.level)
        .unwrap_or_else(|| "info".to_string());
    let log_format = cli.get_log_format().or(early_log.format);
    let log_file = cli.log_file.clone().or(early_log.file);

    let _log_guard =
        logging::init_logging(&log_level, log_format.as_deref(), log_file.as_deref(), cli.quiet)?;

    // 加载配置（按优先级：命令行 > 环境变量 > 配置文件 > 默认值）
    let config = AppConfig::load(&cli).context("加载配置失败")?;

    match &cli.command {
        Some(Commands::Classify {
            action_type,
            offline,
        }) => classify(&config, action_type, *offline),
        Some(Commands::Simulate { script, fail }) => simulate(&config, script, fail).await,
        Some(Commands::Replay { fail }) => replay(&config, fail).await,
        _ => {
            Cli::command().print_help()?;
            println!();
            Ok(())
        }
    }
}

/// 快照回放：恢复已持久化的队列，按在线状态回放到日志执行端，剩余意图写回快照
async fn replay(config: &AppConfig, fail: &[String]) -> Result<()> {
    if !config.persistence.enabled {
        anyhow::bail!("回放需要启用持久化，请指定 --persistence-path 或在配置文件中开启 [persistence]");
    }

    tracing::info!("🚚 Replaying queue snapshot from {}", config.persistence.path);
    tracing::info!("  - Max Retries: {}", config.offline.max_retries);

    let sink = LogActionSink::new().with_failing(fail.iter().cloned());
    let service = match OfflineQueueService::from_config(config, sink, Connectivity::online()) {
        Ok(service) => service,
        Err(e) => {
            tracing::error!("❌ 离线队列初始化失败: {}", e);
            process::exit(1);
        }
    };

    service.start().await?;
    service.replay_now().await;
    service.stop().await?;

    let replayed = service.replay_stats();
    let stats = service.stats().await;
    println!(
        "✅ Replayed {}, retried {}, failed {}",
        replayed.total_replayed, replayed.total_retried, replayed.total_failed
    );
    println!(
        "📦 Still queued: {} (high {}, medium {}, low {})",
        stats.total_intents, stats.high, stats.medium, stats.low
    );
    Ok(())
}

/// 打印某个动作类型的路由结果
fn classify(config: &AppConfig, action_type: &str, offline: bool) -> Result<()> {
    let gate = Gate::from_config(&config.offline);
    let route = gate.route(action_type, !offline);

    println!("🔎 {} ({})", action_type, if offline { "offline" } else { "online" });
    match route {
        Route::Enqueue(priority) => {
            println!("  - Route: enqueue");
            println!("  - Priority: {}", priority);
            println!("  - Retries: {}", config.offline.max_retries);
        }
        Route::Forward(reason) => {
            println!("  - Route: forward ({:?})", reason);
            if gate.is_queueable(action_type) {
                println!("  - Priority when offline: {}", gate.priority_of(action_type));
            }
        }
    }
    Ok(())
}

/// 执行模拟脚本并打印每一步的结果
async fn simulate(config: &AppConfig, script: &str, fail: &[String]) -> Result<()> {
    let steps = simulation::load_script(script)
        .with_context(|| format!("无法读取模拟脚本: {}", script))?;

    let sink = LogActionSink::new().with_failing(fail.iter().cloned());
    let service = OfflineQueueService::new(config, sink, Connectivity::online())?;

    let outcomes = simulation::run_script(&service, steps).await;
    println!("{}", serde_json::to_string_pretty(&outcomes)?);

    let stats = service.stats().await;
    println!(
        "📦 Still queued: {} (high {}, medium {}, low {})",
        stats.total_intents, stats.high, stats.medium, stats.low
    );
    Ok(())
}

/// 生成默认配置文件
fn generate_config(path: &str) -> Result<()> {
    let default_config = r#"# FoodTruck offline queue 配置文件
# 此文件由 foodtruck-offline generate-config 生成

[offline]
max_retries = 3
event_bus_capacity = 1000
queueable_action_types = [
    "orders/createOrder",
    "orders/updateOrder",
    "orders/cancelOrder",
    "user/updateProfile",
    "user/updateFavorites",
]
always_online_action_types = [
    "network/setConnectivity",
    "offline/syncQueue",
    "offline/queueAction",
    "offline/removeFromQueue",
]

[offline.priority_markers]
high = ["order"]
medium = ["user"]

[persistence]
enabled = false
path = "./data/offline-queue"

[logging]
level = "info"
format = "compact"
# file = "./logs/foodtruck-offline.log"
"#;

    fs::write(path, default_config).with_context(|| format!("无法写入配置文件: {}", path))?;

    println!("✅ 配置文件已生成: {}", path);
    Ok(())
}

/// 验证配置文件
fn validate_config(path: &str) -> Result<()> {
    let config = AppConfig::from_toml_file(path)
        .with_context(|| format!("配置文件验证失败: {}", path))?;
    config
        .offline
        .validate()
        .with_context(|| format!("配置文件验证失败: {}", path))?;

    println!("✅ 配置文件有效: {}", path);
    println!("📊 配置摘要:");
    println!("  - Max Retries: {}", config.offline.max_retries);
    println!(
        "  - Queueable Actions: {}",
        config.offline.queueable_action_types.len()
    );
    println!(
        "  - Always-Online Actions: {}",
        config.offline.always_online_action_types.len()
    );
    println!("  - Persistence: {}", config.persistence.enabled);

    Ok(())
}

/// 显示最终配置（合并后的配置）
fn show_config(cli: &Cli) -> Result<()> {
    // 初始化基本日志（用于显示配置）
    let _log_guard = logging::init_logging("info", None, None, false)?;

    let config = AppConfig::load(cli).context("加载配置失败")?;

    println!("📊 最终配置（合并后的配置）:");
    println!("{}", serde_json::to_string_pretty(&config)?);

    Ok(())
}
