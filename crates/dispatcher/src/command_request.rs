use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use fleet_core::{Command, CommandReply};
use tokio::sync::oneshot;

/// 回复回调，每个请求最多被调用一次
pub type ReplyHandler = Box<dyn FnOnce(&CommandRequest, &CommandReply) + Send>;

/// 请求的回复等待方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyMode {
    /// `process` 发送后立即返回，回复由后续 `tick` 送达
    Async,
    /// `process` 阻塞等待匹配回复或超时
    Sync,
}

/// 待发送的命令请求
///
/// 调用 `CommandService::process` 之后请求归服务所有，直到收到回复或超时。
pub struct CommandRequest {
    topic: String,
    command: Command,
    reply_handler: Option<ReplyHandler>,
    mode: ReplyMode,
    reply_timeout: Option<Duration>,
    sent_time: Option<DateTime<Utc>>,
}

impl CommandRequest {
    pub fn new(topic: impl Into<String>, command: Command) -> Self {
        Self {
            topic: topic.into(),
            command,
            reply_handler: None,
            mode: ReplyMode::Async,
            reply_timeout: None,
            sent_time: None,
        }
    }

    pub fn with_reply_callback<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(&CommandRequest, &CommandReply) + Send + 'static,
    {
        self.reply_handler = Some(Box::new(callback));
        self
    }

    /// 使用一次性通道接收回复，替代回调
    pub fn with_reply_channel(self) -> (Self, oneshot::Receiver<CommandReply>) {
        let (tx, rx) = oneshot::channel();
        let request = self.with_reply_callback(move |_, reply| {
            // 接收端已丢弃说明调用方不再关心结果
            let _ = tx.send(reply.clone());
        });
        (request, rx)
    }

    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = Some(timeout);
        self
    }

    pub fn sync_mode(mut self) -> Self {
        self.mode = ReplyMode::Sync;
        self
    }

    pub fn async_mode(mut self) -> Self {
        self.mode = ReplyMode::Async;
        self
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn command(&self) -> &Command {
        &self.command
    }

    pub fn correlation_id(&self) -> &str {
        self.command.correlation_id()
    }

    pub fn mode(&self) -> ReplyMode {
        self.mode
    }

    pub fn is_async(&self) -> bool {
        self.mode == ReplyMode::Async
    }

    /// 请求自身设置的超时，未设置时由服务使用默认值
    pub fn reply_timeout(&self) -> Option<Duration> {
        self.reply_timeout
    }

    pub fn sent_time(&self) -> Option<DateTime<Utc>> {
        self.sent_time
    }

    pub fn is_sent(&self) -> bool {
        self.sent_time.is_some()
    }

    pub(crate) fn mark_sent(&mut self, at: DateTime<Utc>) {
        self.sent_time = Some(at);
    }

    /// 交付回复，回调只会执行一次
    pub(crate) fn complete(mut self, reply: &CommandReply) {
        if let Some(handler) = self.reply_handler.take() {
            handler(&self, reply);
        }
    }
}

impl fmt::Debug for CommandRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandRequest")
            .field("topic", &self.topic)
            .field("command", &self.command)
            .field("mode", &self.mode)
            .field("reply_timeout", &self.reply_timeout)
            .field("sent_time", &self.sent_time)
            .field("has_reply_handler", &self.reply_handler.is_some())
            .finish()
    }
}
