//! 嵌入式Manager宿主
//!
//! 在当前进程内通过内存命令总线运行 [`ManagerWorker`]，供嵌入式部署和测试使用。
//! 跨进程的Manager见 [`crate::remote`]。

use std::sync::Arc;

use fleet_config::{CommandServiceConfig, ManagerConfig, RunnerConfig};
use fleet_core::{CommandInput, CommandReplyOutput, FleetError, FleetResult};
use fleet_dispatcher::CommandService;
use fleet_infrastructure::InMemoryCommandBus;
use fleet_worker::{CommandLineProcessFactory, ManagerWorker, WorkerProcessFactory, WorkerRunner};
use tokio::task::JoinHandle;
use tracing::info;

use crate::shutdown::ShutdownManager;

/// 后台运行的Manager
pub struct EmbeddedManager {
    manager_id: String,
    shutdown: ShutdownManager,
    handle: JoinHandle<()>,
}

impl EmbeddedManager {
    /// 按Manager配置启动，Worker进程由配置中的命令行模板创建
    pub async fn from_config(bus: &InMemoryCommandBus, config: &ManagerConfig) -> FleetResult<Self> {
        let factory = CommandLineProcessFactory::new(config.worker.clone());
        Self::spawn(bus, &config.manager_id, Box::new(factory), &config.runner).await
    }

    pub async fn spawn(
        bus: &InMemoryCommandBus,
        manager_id: &str,
        factory: Box<dyn WorkerProcessFactory>,
        runner_config: &RunnerConfig,
    ) -> FleetResult<Self> {
        let mut runner = WorkerRunner::new(
            ManagerWorker::new(manager_id, factory),
            Arc::new(bus.command_input(manager_id).await?),
            Arc::new(bus.reply_output()),
        );

        let shutdown = ShutdownManager::new();
        let shutdown_rx = shutdown.subscribe();
        let tick_interval = runner_config.tick_interval();

        let handle = tokio::spawn(async move {
            runner.run(shutdown_rx, tick_interval).await;
        });

        info!(manager_id, "嵌入式manager已启动");
        Ok(Self {
            manager_id: manager_id.to_string(),
            shutdown,
            handle,
        })
    }

    pub fn manager_id(&self) -> &str {
        &self.manager_id
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// 发送关闭信号并等待宿主任务退出
    pub async fn shutdown(self) -> FleetResult<()> {
        self.shutdown.shutdown();
        self.handle
            .await
            .map_err(|e| FleetError::Internal(format!("manager任务异常退出: {e}")))?;
        info!(manager_id = %self.manager_id, "嵌入式manager已退出");
        Ok(())
    }
}

/// 连接到总线的命令服务
pub fn command_service(bus: &InMemoryCommandBus, config: &CommandServiceConfig) -> CommandService {
    CommandService::new(Arc::new(bus.command_output()), Arc::new(bus.reply_input()))
        .with_config(config.clone())
}

/// 在给定端口上前台运行Manager，直到收到关闭信号或Manager自行停止
pub async fn run_manager(
    config: &ManagerConfig,
    input: Arc<dyn CommandInput>,
    output: Arc<dyn CommandReplyOutput>,
    shutdown: &ShutdownManager,
) -> FleetResult<()> {
    let factory = CommandLineProcessFactory::new(config.worker.clone());
    let mut runner = WorkerRunner::new(
        ManagerWorker::new(&config.manager_id, Box::new(factory)),
        input,
        output,
    );

    info!(manager_id = %config.manager_id, "manager开始运行");
    runner
        .run(shutdown.subscribe(), config.runner.tick_interval())
        .await;
    Ok(())
}
