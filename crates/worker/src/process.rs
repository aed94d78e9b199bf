//! Worker进程监管
//!
//! [`WorkerProcess`] 包装一个外部启动的操作系统进程，只转发启动、终止和存活查询，
//! 不附加任何重试或容错策略，错误原样返回给调用方。

use std::collections::HashMap;
use std::process::Stdio;

use fleet_config::WorkerProcessTemplate;
use fleet_core::{FleetError, FleetResult, ProcessHandle};
use tokio::process::{Child, Command};
use tracing::{debug, info};

/// 单个Worker实例对应的进程
pub struct WorkerProcess {
    id: String,
    handle: Box<dyn ProcessHandle>,
}

impl WorkerProcess {
    pub fn new(id: impl Into<String>, handle: Box<dyn ProcessHandle>) -> Self {
        Self {
            id: id.into(),
            handle,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn pid(&self) -> Option<u32> {
        self.handle.pid()
    }

    /// 启动进程，发起启动后立即返回，不等待进程结束
    pub fn start(&mut self) -> FleetResult<()> {
        self.handle.start()?;
        info!(worker_id = %self.id, pid = ?self.handle.pid(), "worker进程已启动");
        Ok(())
    }

    /// 请求终止进程
    pub fn kill(&mut self) -> FleetResult<()> {
        self.handle.stop()?;
        info!(worker_id = %self.id, "已发送worker进程终止请求");
        Ok(())
    }

    /// 每次调用都直接查询进程当前状态
    pub fn is_running(&mut self) -> FleetResult<bool> {
        self.handle.is_running()
    }
}

impl std::fmt::Debug for WorkerProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerProcess")
            .field("id", &self.id)
            .field("pid", &self.handle.pid())
            .finish()
    }
}

/// 子进程启动参数
#[derive(Debug, Clone, Default)]
pub struct ProcessSpec {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<String>,
    pub env: HashMap<String, String>,
}

impl ProcessSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// 按模板生成指定Worker的启动参数
    pub fn from_template(template: &WorkerProcessTemplate, worker_id: &str) -> Self {
        Self {
            program: template.program.clone(),
            args: template.render_args(worker_id),
            working_dir: template.working_dir.clone(),
            env: template.env.clone(),
        }
    }
}

/// 基于 `tokio::process` 的进程句柄
///
/// 句柄被丢弃时子进程会被终止。
#[derive(Debug)]
pub struct ChildProcess {
    spec: ProcessSpec,
    child: Option<Child>,
}

impl ChildProcess {
    pub fn new(spec: ProcessSpec) -> Self {
        Self { spec, child: None }
    }
}

impl ProcessHandle for ChildProcess {
    fn start(&mut self) -> FleetResult<()> {
        if let Some(child) = self.child.as_mut() {
            if child.try_wait()?.is_none() {
                return Err(FleetError::Process(format!(
                    "进程已在运行: {}",
                    self.spec.program
                )));
            }
        }

        let mut cmd = Command::new(&self.spec.program);
        cmd.args(&self.spec.args)
            .envs(&self.spec.env)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        if let Some(ref dir) = self.spec.working_dir {
            cmd.current_dir(dir);
        }

        let child = cmd.spawn().map_err(|e| {
            FleetError::Process(format!("启动进程失败: {}: {e}", self.spec.program))
        })?;
        debug!(program = %self.spec.program, pid = ?child.id(), "子进程已创建");

        self.child = Some(child);
        Ok(())
    }

    fn stop(&mut self) -> FleetResult<()> {
        let child = self
            .child
            .as_mut()
            .ok_or_else(|| FleetError::Process(format!("进程未启动: {}", self.spec.program)))?;

        // 已退出的进程不需要再发送信号
        if child.try_wait()?.is_some() {
            return Ok(());
        }

        child
            .start_kill()
            .map_err(|e| FleetError::Process(format!("终止进程失败: {e}")))
    }

    fn is_running(&mut self) -> FleetResult<bool> {
        match self.child.as_mut() {
            Some(child) => Ok(child.try_wait()?.is_none()),
            None => Ok(false),
        }
    }

    fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(Child::id)
    }
}
