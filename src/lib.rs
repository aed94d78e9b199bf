pub mod cli;
pub mod embedded;
#[cfg(unix)]
pub mod remote;
pub mod service_controller;
pub mod shutdown;

pub use embedded::{command_service, run_manager, EmbeddedManager};
#[cfg(unix)]
pub use remote::{remote_command_service, serve_manager};
pub use service_controller::{ServiceController, SystemctlController};
pub use shutdown::{wait_for_shutdown_signal, ShutdownManager};
