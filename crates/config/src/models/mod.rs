pub mod app_config;
pub mod dispatcher_worker;
pub mod manager;

pub use app_config::AppConfig;
pub use dispatcher_worker::{CommandServiceConfig, RunnerConfig};
pub use manager::{ManagerConfig, ManagerSettings, WorkerProcessTemplate};
