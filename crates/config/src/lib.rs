//! 配置管理
//!
//! - [`AppConfig`]: CLI与Manager共用的应用配置（`config/fleet.toml` + `FLEET__*` 环境变量）
//! - [`ManagerConfig`]: 单个Manager实例的配置文件（`<config_root_path>/<manager_id>.toml`）

pub mod models;

pub use models::{
    AppConfig, CommandServiceConfig, ManagerConfig, ManagerSettings, RunnerConfig,
    WorkerProcessTemplate,
};
