pub mod manager;
pub mod process;
pub mod runner;

pub use manager::{CommandLineProcessFactory, ManagerWorker, WorkerProcessFactory};
pub use process::{ChildProcess, ProcessSpec, WorkerProcess};
pub use runner::{RunnerState, WorkerRunner};
