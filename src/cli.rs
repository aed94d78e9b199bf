//! 命令行操作
//!
//! 每个子命令对应一个函数，输出写入调用方提供的 `Write`，便于测试。

use std::io::Write;

use anyhow::{Context, Result};
use fleet_config::ManagerSettings;
use fleet_core::{Command, CommandReply, StandardCommand};
use fleet_dispatcher::{CommandRequest, CommandService};
use tracing::info;

use crate::service_controller::ServiceController;

/// 请求Manager启动Worker，同步等待回复
pub async fn start_worker<W: Write>(
    service: &mut CommandService,
    manager_id: &str,
    worker_id: &str,
    out: &mut W,
) -> Result<CommandReply> {
    let command = StandardCommand::StartWorker {
        worker_id: worker_id.to_string(),
    }
    .into_command();
    send_to_manager(service, manager_id, command, out).await
}

/// 请求Manager终止Worker，同步等待回复
pub async fn kill_worker<W: Write>(
    service: &mut CommandService,
    manager_id: &str,
    worker_id: &str,
    out: &mut W,
) -> Result<CommandReply> {
    let command = StandardCommand::KillWorker {
        uuid: worker_id.to_string(),
    }
    .into_command();
    send_to_manager(service, manager_id, command, out).await
}

async fn send_to_manager<W: Write>(
    service: &mut CommandService,
    manager_id: &str,
    command: Command,
    out: &mut W,
) -> Result<CommandReply> {
    info!(manager_id, command = %command, "发送manager命令");

    let (request, reply_rx) = CommandRequest::new(manager_id, command).with_reply_channel();
    service.process(request.sync_mode()).await;

    let reply = reply_rx.await.context("等待manager回复失败")?;
    writeln!(out, "manager reply: {}", reply.to_json()?)?;
    Ok(reply)
}

/// 通过服务控制器启动Manager实例
///
/// 配置文件不存在时只输出提示，不调用控制器。
pub async fn start_manager<W: Write>(
    settings: &ManagerSettings,
    controller: &dyn ServiceController,
    manager_id: &str,
    out: &mut W,
) -> Result<()> {
    let config_path = settings.config_path(manager_id);
    if !config_path.exists() {
        writeln!(out, "config file isn't exists: {}", config_path.display())?;
        return Ok(());
    }

    writeln!(out, "starting manager with config: {}", config_path.display())?;

    let unit = settings.unit_name(manager_id);
    writeln!(out, "manager instance unit name: {unit}")?;

    let output = controller
        .start(&unit)
        .await
        .with_context(|| format!("启动服务单元失败: {unit}"))?;
    writeln!(out, "systemd start output: {output}")?;

    Ok(())
}

/// 通过服务控制器停止Manager实例
pub async fn stop_manager<W: Write>(
    settings: &ManagerSettings,
    controller: &dyn ServiceController,
    manager_id: &str,
    out: &mut W,
) -> Result<()> {
    let unit = settings.unit_name(manager_id);
    writeln!(out, "manager instance unit name: {unit}")?;

    let output = controller
        .stop(&unit)
        .await
        .with_context(|| format!("停止服务单元失败: {unit}"))?;
    writeln!(out, "systemd stop output: {output}")?;

    Ok(())
}
