//! 跨进程的Manager
//!
//! `run-manager` 在本地套接字上监听命令，`start-worker`/`kill-worker` 等命令行调用
//! 通过同一套接字把命令发给正在运行的Manager并同步等待回复。

use std::sync::Arc;

use fleet_config::{CommandServiceConfig, ManagerConfig, ManagerSettings};
use fleet_core::FleetResult;
use fleet_dispatcher::CommandService;
use fleet_infrastructure::{SocketCommandClient, SocketCommandServer};
use tracing::info;

use crate::embedded::run_manager;
use crate::shutdown::ShutdownManager;

/// 连接到Manager套接字目录的命令服务
pub fn remote_command_service(
    settings: &ManagerSettings,
    config: &CommandServiceConfig,
) -> CommandService {
    let client = SocketCommandClient::new(&settings.socket_dir);
    CommandService::new(Arc::new(client.command_output()), Arc::new(client.reply_input()))
        .with_config(config.clone())
}

/// 在 `<socket_dir>/<manager_id>.sock` 上监听并运行Manager，退出时删除套接字文件
pub async fn serve_manager(
    settings: &ManagerSettings,
    config: &ManagerConfig,
    shutdown: &ShutdownManager,
) -> FleetResult<()> {
    let path = settings.socket_path(&config.manager_id);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let (input, output) = SocketCommandServer::bind(&path).await?.into_ports();
    info!(manager_id = %config.manager_id, path = %path.display(), "manager等待命令");

    run_manager(config, Arc::new(input), Arc::new(output), shutdown).await
}
