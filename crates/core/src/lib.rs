pub mod clock;
pub mod errors;
pub mod logging;
pub mod models;
pub mod traits;

pub use clock::{Clock, ManualClock, SystemClock};
pub use errors::{FleetError, FleetResult};
pub use logging::{init_logging, LogConfig, LogLevel, OutputFormat};
pub use models::{names, Command, CommandReply, ReplyStatus, StandardCommand};
pub use traits::{
    CommandInput, CommandOutput, CommandReplyInput, CommandReplyOutput, ProcessHandle,
    ReplyCallback, Worker, WorkerState,
};
