//! Manager侧命令分派
//!
//! [`CommandService`] 把 [`CommandRequest`] 发送到主题，并保证每个已发送请求的回调
//! 恰好执行一次：要么收到匹配回复，要么超时。

pub mod command_request;
pub mod command_service;

pub use command_request::{CommandRequest, ReplyHandler, ReplyMode};
pub use command_service::CommandService;
