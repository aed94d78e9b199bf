//! 日志初始化
//!
//! 基于 `tracing-subscriber`：`RUST_LOG` 优先，其次使用配置中的日志级别。
//! 日志写到标准错误，标准输出留给命令行结果。

pub mod log_config;
pub mod log_level;

pub use log_config::{LogConfig, OutputFormat};
pub use log_level::LogLevel;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::errors::{FleetError, FleetResult};

/// 初始化全局日志订阅者，重复初始化返回配置错误
pub fn init_logging(config: &LogConfig) -> FleetResult<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_directive()));

    let registry = tracing_subscriber::registry().with(env_filter);

    let result = match config.format {
        OutputFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        OutputFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().pretty().with_writer(std::io::stderr))
            .try_init(),
    };

    result.map_err(|e| FleetError::Configuration(format!("初始化日志系统失败: {e}")))
}
