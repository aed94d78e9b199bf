//! Worker接口定义
//!
//! Worker 是用户自定义的长期运行逻辑，由 WorkerRunner 驱动：
//! - `on_start` 启动时执行一次
//! - `on_tick` 每个tick执行一次，承载Worker的业务逻辑
//! - `on_stop` 停止时执行
//! - `process_command` 处理非停止类命令，并通过 [`ReplyCallback`] 回复
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! use async_trait::async_trait;
//! use fleet_core::{Command, CommandReply, FleetResult, ReplyCallback, Worker, WorkerState};
//!
//! struct EchoWorker {
//!     uuid: String,
//!     state: WorkerState,
//! }
//!
//! #[async_trait]
//! impl Worker for EchoWorker {
//!     fn uuid(&self) -> &str {
//!         &self.uuid
//!     }
//!
//!     fn state(&self) -> WorkerState {
//!         self.state
//!     }
//!
//!     async fn on_start(&mut self) -> FleetResult<()> {
//!         self.state = WorkerState::Running;
//!         Ok(())
//!     }
//!
//!     async fn on_tick(&mut self) -> FleetResult<()> {
//!         Ok(())
//!     }
//!
//!     async fn on_stop(&mut self) -> FleetResult<()> {
//!         self.state = WorkerState::Stopped;
//!         Ok(())
//!     }
//!
//!     async fn process_command(&mut self, command: Command, reply: ReplyCallback) -> FleetResult<()> {
//!         reply
//!             .send(CommandReply::success(command.correlation_id(), command.name()))
//!             .await
//!     }
//! }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::errors::FleetResult;
use crate::models::{Command, CommandReply};
use crate::traits::CommandReplyOutput;

/// Worker生命周期状态，Stopped 为终态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerState {
    NotStarted,
    Running,
    Stopped,
}

/// Worker能力集合
#[async_trait]
pub trait Worker: Send {
    fn uuid(&self) -> &str;

    fn state(&self) -> WorkerState;

    fn is_stopped(&self) -> bool {
        self.state() == WorkerState::Stopped
    }

    async fn on_start(&mut self) -> FleetResult<()>;

    async fn on_tick(&mut self) -> FleetResult<()>;

    async fn on_stop(&mut self) -> FleetResult<()>;

    /// 处理命令，Worker自行决定何时通过回调发送回复
    async fn process_command(&mut self, command: Command, reply: ReplyCallback)
        -> FleetResult<()>;
}

/// 单条命令的回复通道
///
/// 发送即消耗，每个回调最多发出一条回复。
pub struct ReplyCallback {
    command: Command,
    output: Arc<dyn CommandReplyOutput>,
}

impl ReplyCallback {
    pub fn new(command: Command, output: Arc<dyn CommandReplyOutput>) -> Self {
        Self { command, output }
    }

    /// 回复对应的原始命令
    pub fn command(&self) -> &Command {
        &self.command
    }

    /// 先记录回复再发送，发送失败也能在日志中看到这条回复
    pub async fn send(self, reply: CommandReply) -> FleetResult<()> {
        info!(
            command = %self.command,
            correlation_id = reply.correlation_id(),
            status = ?reply.status(),
            message = reply.message(),
            "sending reply"
        );

        if let Err(e) = self.output.send(&reply, true).await {
            error!(
                command = %self.command,
                correlation_id = reply.correlation_id(),
                error = %e,
                "发送回复失败"
            );
            return Err(e);
        }
        Ok(())
    }
}

impl std::fmt::Debug for ReplyCallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplyCallback")
            .field("command", &self.command)
            .finish_non_exhaustive()
    }
}
