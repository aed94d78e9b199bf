pub mod command;
pub mod reply;

pub use command::{names, Command, StandardCommand};
pub use reply::{CommandReply, ReplyStatus};
