//! Manager进程自身的Worker实现
//!
//! 按命令启动和终止Worker进程，并在每个tick检查进程存活情况。

use std::collections::HashMap;

use async_trait::async_trait;
use fleet_config::WorkerProcessTemplate;
use fleet_core::{
    Command, CommandReply, FleetError, FleetResult, ProcessHandle, ReplyCallback,
    StandardCommand, Worker, WorkerState,
};
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::process::{ChildProcess, ProcessSpec, WorkerProcess};

/// Worker进程工厂
pub trait WorkerProcessFactory: Send + Sync {
    fn create(&self, worker_id: &str) -> FleetResult<Box<dyn ProcessHandle>>;
}

/// 按命令行模板创建子进程，参数中的 `{id}` 替换为Worker ID
#[derive(Debug, Clone)]
pub struct CommandLineProcessFactory {
    template: WorkerProcessTemplate,
}

impl CommandLineProcessFactory {
    pub fn new(template: WorkerProcessTemplate) -> Self {
        Self { template }
    }

    pub fn template(&self) -> &WorkerProcessTemplate {
        &self.template
    }
}

impl WorkerProcessFactory for CommandLineProcessFactory {
    fn create(&self, worker_id: &str) -> FleetResult<Box<dyn ProcessHandle>> {
        let spec = ProcessSpec::from_template(&self.template, worker_id);
        Ok(Box::new(ChildProcess::new(spec)))
    }
}

pub struct ManagerWorker {
    uuid: String,
    state: WorkerState,
    factory: Box<dyn WorkerProcessFactory>,
    processes: HashMap<String, WorkerProcess>,
}

impl ManagerWorker {
    pub fn new(uuid: impl Into<String>, factory: Box<dyn WorkerProcessFactory>) -> Self {
        Self {
            uuid: uuid.into(),
            state: WorkerState::NotStarted,
            factory,
            processes: HashMap::new(),
        }
    }

    /// 当前托管的Worker ID
    pub fn worker_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.processes.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn process_count(&self) -> usize {
        self.processes.len()
    }

    pub fn has_worker(&self, worker_id: &str) -> bool {
        self.processes.contains_key(worker_id)
    }

    async fn start_worker(
        &mut self,
        command: &Command,
        worker_id: String,
        reply: ReplyCallback,
    ) -> FleetResult<()> {
        if let Some(process) = self.processes.get_mut(&worker_id) {
            if process.is_running()? {
                warn!(manager_id = %self.uuid, worker_id = %worker_id, "worker已在运行");
                return reply
                    .send(
                        CommandReply::error(command.correlation_id(), "worker already running")
                            .with_data(json!({ "worker_id": worker_id })),
                    )
                    .await;
            }
        }

        let handle = self.factory.create(&worker_id)?;
        let mut process = WorkerProcess::new(worker_id.clone(), handle);
        process.start()?;
        let pid = process.pid();
        self.processes.insert(worker_id.clone(), process);

        reply
            .send(
                CommandReply::success(command.correlation_id(), "worker started")
                    .with_data(json!({ "worker_id": worker_id, "pid": pid })),
            )
            .await
    }

    async fn kill_worker(
        &mut self,
        command: &Command,
        worker_id: String,
        reply: ReplyCallback,
    ) -> FleetResult<()> {
        let Some(process) = self.processes.get_mut(&worker_id) else {
            warn!(manager_id = %self.uuid, worker_id = %worker_id, "未找到worker");
            return reply
                .send(
                    CommandReply::error(command.correlation_id(), "worker not found")
                        .with_data(json!({ "worker_id": worker_id })),
                )
                .await;
        };

        process.kill()?;
        self.processes.remove(&worker_id);

        reply
            .send(
                CommandReply::success(command.correlation_id(), "worker killed")
                    .with_data(json!({ "worker_id": worker_id })),
            )
            .await
    }
}

#[async_trait]
impl Worker for ManagerWorker {
    fn uuid(&self) -> &str {
        &self.uuid
    }

    fn state(&self) -> WorkerState {
        self.state
    }

    async fn on_start(&mut self) -> FleetResult<()> {
        self.state = WorkerState::Running;
        info!(manager_id = %self.uuid, "manager已启动");
        Ok(())
    }

    async fn on_tick(&mut self) -> FleetResult<()> {
        let mut exited = Vec::new();

        for (worker_id, process) in self.processes.iter_mut() {
            match process.is_running() {
                Ok(true) => {}
                Ok(false) => exited.push(worker_id.clone()),
                Err(e) => {
                    error!(manager_id = %self.uuid, worker_id = %worker_id, error = %e, "查询worker进程状态失败");
                }
            }
        }

        for worker_id in exited {
            self.processes.remove(&worker_id);
            warn!(manager_id = %self.uuid, worker_id = %worker_id, "worker进程已退出");
        }

        debug!(manager_id = %self.uuid, workers = self.processes.len(), "存活检查完成");
        Ok(())
    }

    async fn on_stop(&mut self) -> FleetResult<()> {
        for (worker_id, process) in self.processes.iter_mut() {
            if let Err(e) = process.kill() {
                error!(manager_id = %self.uuid, worker_id = %worker_id, error = %e, "终止worker进程失败");
            }
        }
        self.processes.clear();

        self.state = WorkerState::Stopped;
        info!(manager_id = %self.uuid, "manager已停止");
        Ok(())
    }

    async fn process_command(&mut self, command: Command, reply: ReplyCallback) -> FleetResult<()> {
        match StandardCommand::parse(&command)? {
            Some(StandardCommand::StartWorker { worker_id }) => {
                self.start_worker(&command, worker_id, reply).await
            }
            Some(StandardCommand::KillWorker { uuid }) => {
                self.kill_worker(&command, uuid, reply).await
            }
            _ => Err(FleetError::CommandProcessing(format!(
                "unsupported command: {}",
                command.name()
            ))),
        }
    }
}
