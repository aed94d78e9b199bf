use thiserror::Error;

/// 集群管理错误类型定义
#[derive(Debug, Error)]
pub enum FleetError {
    #[error("传输错误: {0}")]
    Transport(String),

    #[error("命令处理错误: {0}")]
    CommandProcessing(String),

    #[error("命令回复超时: {correlation_id}")]
    Timeout { correlation_id: String },

    #[error("进程错误: {0}")]
    Process(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for FleetError {
    fn from(err: serde_json::Error) -> Self {
        FleetError::Serialization(err.to_string())
    }
}

/// 统一的Result类型
pub type FleetResult<T> = std::result::Result<T, FleetError>;
