use std::time::Duration;

use serde::{Deserialize, Serialize};

/// CommandService 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandServiceConfig {
    /// 请求未指定超时时使用的回复超时（秒）
    pub reply_timeout_seconds: u64,
    /// 同步等待回复时两次空轮询之间的间隔（毫秒）
    pub sync_poll_interval_ms: u64,
}

impl Default for CommandServiceConfig {
    fn default() -> Self {
        Self {
            reply_timeout_seconds: 30,
            sync_poll_interval_ms: 10,
        }
    }
}

impl CommandServiceConfig {
    pub fn reply_timeout(&self) -> Duration {
        Duration::from_secs(self.reply_timeout_seconds)
    }

    pub fn sync_poll_interval(&self) -> Duration {
        Duration::from_millis(self.sync_poll_interval_ms)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.reply_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("回复超时时间必须大于0"));
        }

        if self.sync_poll_interval_ms == 0 {
            return Err(anyhow::anyhow!("同步轮询间隔必须大于0"));
        }

        if self.sync_poll_interval_ms > self.reply_timeout_seconds * 1000 {
            return Err(anyhow::anyhow!(
                "同步轮询间隔 {}ms 不能超过回复超时时间 {}s",
                self.sync_poll_interval_ms,
                self.reply_timeout_seconds
            ));
        }

        Ok(())
    }
}

/// WorkerRunner 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// 宿主循环的tick间隔（毫秒）
    pub tick_interval_ms: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100,
        }
    }
}

impl RunnerConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.tick_interval_ms == 0 {
            return Err(anyhow::anyhow!("tick间隔必须大于0"));
        }
        Ok(())
    }
}
