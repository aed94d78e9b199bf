//! 系统服务控制
//!
//! Manager进程以systemd模板单元运行，单元名形如 `worker-manager@<id>.service`。

use async_trait::async_trait;
use fleet_core::{FleetError, FleetResult};
use tokio::process::Command;
use tracing::{debug, info};

/// 启停系统服务单元，返回控制命令的输出
#[async_trait]
pub trait ServiceController: Send + Sync {
    async fn start(&self, unit: &str) -> FleetResult<String>;

    async fn stop(&self, unit: &str) -> FleetResult<String>;
}

/// 调用 `systemctl` 的实现
#[derive(Debug, Clone)]
pub struct SystemctlController {
    program: String,
}

impl Default for SystemctlController {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemctlController {
    pub fn new() -> Self {
        Self::with_program("systemctl")
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn run(&self, action: &str, unit: &str) -> FleetResult<String> {
        debug!(program = %self.program, action, unit, "执行服务控制命令");

        let output = Command::new(&self.program)
            .arg(action)
            .arg(unit)
            .output()
            .await
            .map_err(|e| FleetError::Process(format!("执行 {} 失败: {e}", self.program)))?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));

        if !output.status.success() {
            return Err(FleetError::Process(format!(
                "{} {action} {unit} 退出状态 {}: {}",
                self.program,
                output.status,
                text.trim()
            )));
        }

        info!(action, unit, "服务控制命令执行完成");
        Ok(text)
    }
}

#[async_trait]
impl ServiceController for SystemctlController {
    async fn start(&self, unit: &str) -> FleetResult<String> {
        self.run("start", unit).await
    }

    async fn stop(&self, unit: &str) -> FleetResult<String> {
        self.run("stop", unit).await
    }
}
