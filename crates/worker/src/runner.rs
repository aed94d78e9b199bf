//! Worker运行器
//!
//! 驱动单个 [`Worker`] 的生命周期：启动、逐tick处理命令并执行Worker逻辑、停止。
//! Worker自身的错误和panic都在这里被捕获并记录，不会中断驱动循环。

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use fleet_core::{
    names, Command, CommandInput, CommandReply, CommandReplyOutput, FleetError, FleetResult,
    ReplyCallback, Worker,
};
use futures::FutureExt;
use serde_json::json;
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{error, info, warn};

/// 运行器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    Created,
    Starting,
    Ticking,
    Stopping,
    Stopped,
}

pub struct WorkerRunner<W: Worker> {
    worker: W,
    command_input: Arc<dyn CommandInput>,
    reply_output: Arc<dyn CommandReplyOutput>,
    state: RunnerState,
}

impl<W: Worker> WorkerRunner<W> {
    pub fn new(
        worker: W,
        command_input: Arc<dyn CommandInput>,
        reply_output: Arc<dyn CommandReplyOutput>,
    ) -> Self {
        Self {
            worker,
            command_input,
            reply_output,
            state: RunnerState::Created,
        }
    }

    pub fn worker(&self) -> &W {
        &self.worker
    }

    pub fn state(&self) -> RunnerState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        !self.worker.is_stopped()
    }

    /// 启动Worker，失败只记录日志
    pub async fn start(&mut self) {
        self.state = RunnerState::Starting;
        info!(worker_id = self.worker.uuid(), "启动worker");

        if let Err(e) = guarded(self.worker.on_start()).await {
            error!(worker_id = self.worker.uuid(), error = %e, "worker启动失败");
        }

        self.state = RunnerState::Ticking;
    }

    /// 单次驱动：最多处理一条入站命令，然后执行一次Worker tick
    pub async fn tick(&mut self) {
        if self.worker.is_stopped() {
            return;
        }

        match self.command_input.get_next().await {
            Ok(Some(command)) => self.process_command(command).await,
            Ok(None) => {}
            Err(e) => {
                error!(worker_id = self.worker.uuid(), error = %e, "读取命令失败");
            }
        }

        if self.worker.is_stopped() {
            return;
        }

        if let Err(e) = guarded(self.worker.on_tick()).await {
            error!(worker_id = self.worker.uuid(), error = %e, "worker tick失败");
        }
    }

    /// 停止Worker并关闭端口，每一步独立执行
    pub async fn stop(&mut self) {
        self.state = RunnerState::Stopping;
        info!(worker_id = self.worker.uuid(), "停止worker");

        if !self.worker.is_stopped() {
            if let Err(e) = guarded(self.worker.on_stop()).await {
                error!(worker_id = self.worker.uuid(), error = %e, "worker停止失败");
            }
        }

        if let Err(e) = self.command_input.close().await {
            error!(worker_id = self.worker.uuid(), error = %e, "关闭命令输入失败");
        }

        if let Err(e) = self.reply_output.close().await {
            error!(worker_id = self.worker.uuid(), error = %e, "关闭回复输出失败");
        }

        self.state = RunnerState::Stopped;
        info!(worker_id = self.worker.uuid(), "worker已停止");
    }

    /// 宿主循环：按间隔tick，直到Worker停止或收到关闭信号
    pub async fn run(&mut self, mut shutdown_rx: broadcast::Receiver<()>, tick_interval: Duration) {
        self.start().await;

        let mut ticker = interval(tick_interval);
        while self.is_running() {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                _ = shutdown_rx.recv() => {
                    info!(worker_id = self.worker.uuid(), "收到关闭信号");
                    break;
                }
            }
        }

        self.stop().await;
    }

    async fn process_command(&mut self, command: Command) {
        info!(
            worker_id = self.worker.uuid(),
            command = %command,
            "process command"
        );

        let result = if command.is_named(names::WORKER_STOP) {
            self.on_stop_command(&command).await
        } else {
            let reply = self.reply_callback(&command);
            guarded(self.worker.process_command(command.clone(), reply)).await
        };

        if let Err(e) = result {
            self.on_process_command_error(&command, e).await;
        }
    }

    async fn on_stop_command(&mut self, command: &Command) -> FleetResult<()> {
        guarded(self.worker.on_stop()).await?;
        self.reply_callback(command)
            .send(CommandReply::success(command.correlation_id(), "stopped"))
            .await
    }

    async fn on_process_command_error(&mut self, command: &Command, err: FleetError) {
        error!(
            worker_id = self.worker.uuid(),
            command = %command,
            error = %err,
            "执行命令失败"
        );

        let reply = CommandReply::error(command.correlation_id(), "exception when execute command")
            .with_data(json!({ "exception_message": err.to_string() }));

        if let Err(e) = self.reply_callback(command).send(reply).await {
            warn!(
                worker_id = self.worker.uuid(),
                command = %command,
                error = %e,
                "发送错误回复失败"
            );
        }
    }

    fn reply_callback(&self, command: &Command) -> ReplyCallback {
        ReplyCallback::new(command.clone(), Arc::clone(&self.reply_output))
    }
}

/// 执行Worker回调，panic转换为命令处理错误
async fn guarded<F>(future: F) -> FleetResult<()>
where
    F: Future<Output = FleetResult<()>>,
{
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(FleetError::CommandProcessing(format!(
            "worker panicked: {}",
            panic_message(panic.as_ref())
        ))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
