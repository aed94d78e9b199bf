use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::errors::{FleetError, FleetResult};

/// 保留的命令名称
pub mod names {
    /// 终止指定Worker进程
    pub const WORKER_KILL: &str = "command.worker.kill";
    /// 让Worker进入停止流程
    pub const WORKER_STOP: &str = "command.worker.stop";
    /// 由Manager启动一个Worker
    pub const MANAGER_START: &str = "command.manager.start";
}

/// 命令消息
///
/// 创建后不可变，`name` 用于分派，`correlation_id` 用于匹配回复。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    name: String,
    correlation_id: String,
    #[serde(default)]
    payload: Value,
}

impl Command {
    /// 使用指定关联ID创建命令
    pub fn new(correlation_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            correlation_id: correlation_id.into(),
            payload: Value::Null,
        }
    }

    /// 创建命令并生成新的关联ID
    pub fn named(name: impl Into<String>) -> Self {
        Self::new(Uuid::new_v4().to_string(), name)
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn is_named(&self, name: &str) -> bool {
        self.name == name
    }

    /// 读取字符串类型的载荷字段
    pub fn payload_str(&self, field: &str) -> Option<&str> {
        self.payload.get(field).and_then(Value::as_str)
    }

    pub fn to_json(&self) -> FleetResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> FleetResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.name, self.correlation_id)
    }
}

/// 系统内置命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StandardCommand {
    KillWorker { uuid: String },
    StopWorker,
    StartWorker { worker_id: String },
}

impl StandardCommand {
    pub fn name(&self) -> &'static str {
        match self {
            StandardCommand::KillWorker { .. } => names::WORKER_KILL,
            StandardCommand::StopWorker => names::WORKER_STOP,
            StandardCommand::StartWorker { .. } => names::MANAGER_START,
        }
    }

    fn payload(&self) -> Value {
        match self {
            StandardCommand::KillWorker { uuid } => json!({ "uuid": uuid }),
            StandardCommand::StopWorker => Value::Null,
            StandardCommand::StartWorker { worker_id } => json!({ "worker_id": worker_id }),
        }
    }

    /// 转换为带新关联ID的命令
    pub fn into_command(self) -> Command {
        Command::named(self.name()).with_payload(self.payload())
    }

    pub fn with_correlation_id(self, correlation_id: impl Into<String>) -> Command {
        Command::new(correlation_id, self.name()).with_payload(self.payload())
    }

    /// 解析内置命令，非保留名称返回 `None`
    pub fn parse(command: &Command) -> FleetResult<Option<Self>> {
        let parsed = match command.name() {
            names::WORKER_KILL => Some(StandardCommand::KillWorker {
                uuid: required_field(command, "uuid")?,
            }),
            names::WORKER_STOP => Some(StandardCommand::StopWorker),
            names::MANAGER_START => Some(StandardCommand::StartWorker {
                worker_id: required_field(command, "worker_id")?,
            }),
            _ => None,
        };
        Ok(parsed)
    }
}

fn required_field(command: &Command, field: &str) -> FleetResult<String> {
    command
        .payload_str(field)
        .map(str::to_string)
        .ok_or_else(|| {
            FleetError::Serialization(format!("命令 {command} 缺少字段: {field}"))
        })
}
