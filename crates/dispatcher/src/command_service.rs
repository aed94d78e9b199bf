//! Manager侧命令服务
//!
//! 负责把命令发送到主题、按关联ID跟踪未完成请求、匹配回复并清理超时请求。
//! 服务由外部循环反复调用 [`CommandService::tick`] 驱动，本身不创建后台任务；
//! 所有方法都需要 `&mut self`，未完成请求表只会被驱动它的那个调用方修改。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use fleet_config::CommandServiceConfig;
use fleet_core::{Clock, CommandOutput, CommandReply, CommandReplyInput, SystemClock};
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::command_request::{CommandRequest, ReplyMode};

pub struct CommandService {
    output: Arc<dyn CommandOutput>,
    reply_input: Arc<dyn CommandReplyInput>,
    clock: Arc<dyn Clock>,
    config: CommandServiceConfig,
    pending: HashMap<String, CommandRequest>,
}

impl CommandService {
    pub fn new(output: Arc<dyn CommandOutput>, reply_input: Arc<dyn CommandReplyInput>) -> Self {
        Self {
            output,
            reply_input,
            clock: Arc::new(SystemClock),
            config: CommandServiceConfig::default(),
            pending: HashMap::new(),
        }
    }

    /// 替换超时判断使用的时钟
    ///
    /// 同步模式只在时钟前进后才会判定超时，注入不前进的时钟时同步等待要靠回复才能返回。
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_config(mut self, config: CommandServiceConfig) -> Self {
        self.config = config;
        self
    }

    /// 发送请求
    ///
    /// 发送失败时请求不会进入未完成表，回调立即以错误回复执行一次。
    /// 同步模式下会一直轮询回复输入，直到收到匹配回复或请求超时。
    pub async fn process(&mut self, mut request: CommandRequest) {
        let correlation_id = request.correlation_id().to_string();

        if self.pending.contains_key(&correlation_id) {
            warn!(
                correlation_id = %correlation_id,
                topic = request.topic(),
                "关联ID已存在未完成请求，拒绝发送"
            );
            let reply = CommandReply::error(
                correlation_id.clone(),
                format!("duplicate correlation id: {correlation_id}"),
            );
            request.complete(&reply);
            return;
        }

        info!(
            topic = request.topic(),
            command = %request.command(),
            mode = ?request.mode(),
            "sending command"
        );

        if let Err(e) = self
            .output
            .send(request.topic(), request.command(), false)
            .await
        {
            error!(
                correlation_id = %correlation_id,
                topic = request.topic(),
                error = %e,
                "发送命令失败"
            );
            let reply = CommandReply::error(
                correlation_id.clone(),
                format!("exception when sending command: {e}"),
            );
            request.complete(&reply);
            return;
        }

        request.mark_sent(self.clock.now());
        let mode = request.mode();
        self.pending.insert(correlation_id.clone(), request);

        if mode == ReplyMode::Sync {
            self.wait_for_reply(&correlation_id).await;
        }
    }

    /// 单次驱动：最多取一条回复进行匹配，然后清理超时请求
    pub async fn tick(&mut self) {
        self.poll_reply().await;
        self.expire_timed_out_requests();
    }

    /// 关闭输出和回复输入，未完成请求直接丢弃
    pub async fn stop(&mut self) {
        if !self.pending.is_empty() {
            warn!(
                pending = self.pending.len(),
                "命令服务停止，放弃未完成的请求"
            );
        }

        if let Err(e) = self.output.close().await {
            error!(error = %e, "关闭命令输出失败");
        }

        if let Err(e) = self.reply_input.close().await {
            error!(error = %e, "关闭回复输入失败");
        }

        info!("命令服务已停止");
    }

    pub fn pending_requests(&self) -> &HashMap<String, CommandRequest> {
        &self.pending
    }

    pub fn pending_request(&self, correlation_id: &str) -> Option<&CommandRequest> {
        self.pending.get(correlation_id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    async fn wait_for_reply(&mut self, correlation_id: &str) {
        debug!(correlation_id, "同步等待回复");

        loop {
            let received = self.poll_reply().await;

            let timed_out = match self.pending.get(correlation_id) {
                Some(request) => self.is_timed_out(request, self.clock.now()),
                None => return,
            };

            if timed_out {
                self.expire(correlation_id);
                return;
            }

            if !received {
                tokio::time::sleep(self.config.sync_poll_interval()).await;
            }
        }
    }

    /// 取一条回复并交付，返回是否取到了回复
    async fn poll_reply(&mut self) -> bool {
        match self.reply_input.get_next().await {
            Ok(Some(reply)) => {
                self.deliver_reply(reply);
                true
            }
            Ok(None) => false,
            Err(e) => {
                error!(error = %e, "读取命令回复失败");
                false
            }
        }
    }

    fn deliver_reply(&mut self, reply: CommandReply) {
        match self.pending.remove(reply.correlation_id()) {
            Some(request) => {
                info!(
                    correlation_id = reply.correlation_id(),
                    topic = request.topic(),
                    status = ?reply.status(),
                    message = reply.message(),
                    "received reply"
                );
                request.complete(&reply);
            }
            None => {
                debug!(
                    correlation_id = reply.correlation_id(),
                    "回复没有对应的未完成请求，忽略"
                );
            }
        }
    }

    fn expire_timed_out_requests(&mut self) {
        let now = self.clock.now();
        let expired: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, request)| self.is_timed_out(request, now))
            .map(|(id, _)| id.clone())
            .collect();

        for correlation_id in expired {
            self.expire(&correlation_id);
        }
    }

    fn expire(&mut self, correlation_id: &str) {
        let Some(request) = self.pending.remove(correlation_id) else {
            return;
        };

        let timeout = self.reply_timeout_of(&request);
        warn!(
            correlation_id,
            topic = request.topic(),
            timeout_seconds = timeout.as_secs_f64(),
            "命令回复超时"
        );

        let reply = CommandReply::error(correlation_id, "reply timeout")
            .with_data(json!({ "timeout_seconds": timeout.as_secs_f64() }));
        request.complete(&reply);
    }

    fn reply_timeout_of(&self, request: &CommandRequest) -> Duration {
        request
            .reply_timeout()
            .unwrap_or_else(|| self.config.reply_timeout())
    }

    fn is_timed_out(&self, request: &CommandRequest, now: DateTime<Utc>) -> bool {
        let Some(sent_time) = request.sent_time() else {
            return false;
        };

        // 时钟回拨时 to_std 失败，视为未超时
        (now - sent_time)
            .to_std()
            .map(|elapsed| elapsed >= self.reply_timeout_of(request))
            .unwrap_or(false)
    }
}
