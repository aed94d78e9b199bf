use std::io;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fleet::cli;
use fleet::{wait_for_shutdown_signal, ShutdownManager, SystemctlController};
use fleet_config::{AppConfig, ManagerConfig};
use fleet_core::{init_logging, LogLevel, OutputFormat};
use fleet_dispatcher::CommandService;
use tracing::{error, info};

/// Worker进程集群管理工具
#[derive(Parser, Debug)]
#[command(name = "fleet")]
#[command(version = "1.0.0")]
#[command(about = "Worker进程集群管理工具")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// 配置文件路径
    #[arg(short, long)]
    config: Option<String>,

    /// 日志级别
    #[arg(short, long, value_parser = ["trace", "debug", "info", "warn", "error"])]
    log_level: Option<String>,

    /// 日志格式
    #[arg(long, value_parser = ["json", "pretty"])]
    log_format: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 请求Manager启动Worker
    StartWorker {
        /// Manager ID
        manager: String,
        /// Worker ID
        worker: String,
    },
    /// 请求Manager终止Worker
    KillWorker {
        /// Manager ID
        manager: String,
        /// Worker ID
        worker: String,
    },
    /// 通过systemd启动Manager实例
    StartManager {
        /// Manager ID
        manager: String,
    },
    /// 通过systemd停止Manager实例
    StopManager {
        /// Manager ID
        manager: String,
    },
    /// 在前台运行Manager
    RunManager {
        /// Manager ID
        manager: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let config = AppConfig::load(args.config.as_deref()).context("加载配置失败")?;

    let mut log_config = config.logging.clone().with_env_overrides();
    if let Some(level) = args.log_level.as_deref() {
        log_config.level = level.parse::<LogLevel>()?;
    }
    if let Some(format) = args.log_format.as_deref() {
        log_config = log_config.with_format(match format {
            "json" => OutputFormat::Json,
            _ => OutputFormat::Pretty,
        });
    }
    init_logging(&log_config)?;

    let mut stdout = io::stdout();

    match args.command {
        Commands::StartWorker { manager, worker } => {
            let mut service = manager_command_service(&config)?;
            cli::start_worker(&mut service, &manager, &worker, &mut stdout).await?;
            service.stop().await;
        }
        Commands::KillWorker { manager, worker } => {
            let mut service = manager_command_service(&config)?;
            cli::kill_worker(&mut service, &manager, &worker, &mut stdout).await?;
            service.stop().await;
        }
        Commands::StartManager { manager } => {
            let controller = SystemctlController::new();
            cli::start_manager(&config.manager, &controller, &manager, &mut stdout).await?;
        }
        Commands::StopManager { manager } => {
            let controller = SystemctlController::new();
            cli::stop_manager(&config.manager, &controller, &manager, &mut stdout).await?;
        }
        Commands::RunManager { manager } => {
            let manager_config = load_manager_config(&config, &manager)?;
            let shutdown = ShutdownManager::new();

            let signal_shutdown = shutdown.clone();
            tokio::spawn(async move {
                wait_for_shutdown_signal().await;
                signal_shutdown.shutdown();
            });

            if let Err(e) = host_manager(&config, &manager_config, &shutdown).await {
                error!(manager_id = %manager, error = %e, "manager运行失败");
                return Err(e);
            }
            info!(manager_id = %manager, "manager已退出");
        }
    }

    Ok(())
}

fn load_manager_config(config: &AppConfig, manager_id: &str) -> Result<ManagerConfig> {
    let path = config.manager.config_path(manager_id);
    ManagerConfig::load(&path)
        .with_context(|| format!("加载Manager配置失败: {}", path.display()))
}

#[cfg(unix)]
fn manager_command_service(config: &AppConfig) -> Result<CommandService> {
    Ok(fleet::remote_command_service(
        &config.manager,
        &config.command_service,
    ))
}

#[cfg(not(unix))]
fn manager_command_service(_config: &AppConfig) -> Result<CommandService> {
    anyhow::bail!("当前平台不支持本地套接字，无法连接Manager")
}

#[cfg(unix)]
async fn host_manager(
    config: &AppConfig,
    manager_config: &ManagerConfig,
    shutdown: &ShutdownManager,
) -> Result<()> {
    fleet::serve_manager(&config.manager, manager_config, shutdown).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn host_manager(
    _config: &AppConfig,
    _manager_config: &ManagerConfig,
    _shutdown: &ShutdownManager,
) -> Result<()> {
    anyhow::bail!("当前平台不支持本地套接字，无法运行Manager")
}
