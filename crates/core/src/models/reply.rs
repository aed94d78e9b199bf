use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::FleetResult;

/// 回复状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyStatus {
    Success,
    Error,
}

/// 命令回复，通过 `correlation_id` 与原始命令关联
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandReply {
    correlation_id: String,
    status: ReplyStatus,
    message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl CommandReply {
    pub fn success(correlation_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            status: ReplyStatus::Success,
            message: message.into(),
            data: None,
        }
    }

    pub fn error(correlation_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            status: ReplyStatus::Error,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn status(&self) -> ReplyStatus {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    pub fn is_success(&self) -> bool {
        self.status == ReplyStatus::Success
    }

    pub fn is_error(&self) -> bool {
        self.status == ReplyStatus::Error
    }

    pub fn to_json(&self) -> FleetResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> FleetResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
