//! 命令传输端口
//!
//! CommandService 与 WorkerRunner 只依赖这里的四个接口，具体传输方式（队列、套接字、管道）由外部实现。
//! `get_next` 均为非阻塞轮询：没有可用消息时立即返回 `Ok(None)`。

use async_trait::async_trait;

use crate::errors::FleetResult;
use crate::models::{Command, CommandReply};

/// 命令发送端（Manager侧）
#[async_trait]
pub trait CommandOutput: Send + Sync {
    /// 发送命令到指定主题，失败时返回 `FleetError::Transport`
    async fn send(&self, topic: &str, command: &Command, is_reply: bool) -> FleetResult<()>;

    async fn close(&self) -> FleetResult<()>;
}

/// 回复接收端（Manager侧）
#[async_trait]
pub trait CommandReplyInput: Send + Sync {
    async fn get_next(&self) -> FleetResult<Option<CommandReply>>;

    async fn close(&self) -> FleetResult<()>;
}

/// 命令接收端（Worker侧）
#[async_trait]
pub trait CommandInput: Send + Sync {
    async fn get_next(&self) -> FleetResult<Option<Command>>;

    async fn close(&self) -> FleetResult<()>;
}

/// 回复发送端（Worker侧）
#[async_trait]
pub trait CommandReplyOutput: Send + Sync {
    async fn send(&self, reply: &CommandReply, is_reply: bool) -> FleetResult<()>;

    async fn close(&self) -> FleetResult<()>;
}
