pub mod command_transport;
pub mod process;
pub mod worker;

pub use command_transport::{CommandInput, CommandOutput, CommandReplyInput, CommandReplyOutput};
pub use process::ProcessHandle;
pub use worker::{ReplyCallback, Worker, WorkerState};
