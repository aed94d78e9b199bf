use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use fleet_config::WorkerProcessTemplate;
use fleet_core::{
    Command, FleetError, FleetResult, ProcessHandle, ReplyCallback, ReplyStatus, StandardCommand,
    Worker, WorkerState,
};
use fleet_testing_utils::{MockCommandReplyOutput, MockProcessHandle};
use fleet_worker::{CommandLineProcessFactory, ManagerWorker, WorkerProcessFactory};
use serde_json::json;

/// 记录创建过的进程句柄，测试可以直接操控它们
#[derive(Clone, Default)]
struct RecordingFactory {
    handles: Arc<Mutex<HashMap<String, MockProcessHandle>>>,
    created: Arc<Mutex<Vec<String>>>,
}

impl RecordingFactory {
    fn handle(&self, worker_id: &str) -> MockProcessHandle {
        self.handles.lock().unwrap()[worker_id].clone()
    }

    fn created(&self) -> Vec<String> {
        self.created.lock().unwrap().clone()
    }
}

impl WorkerProcessFactory for RecordingFactory {
    fn create(&self, worker_id: &str) -> FleetResult<Box<dyn ProcessHandle>> {
        let handle = MockProcessHandle::new().with_pid(1000);
        self.handles
            .lock()
            .unwrap()
            .insert(worker_id.to_string(), handle.clone());
        self.created.lock().unwrap().push(worker_id.to_string());
        Ok(Box::new(handle))
    }
}

struct Fixture {
    factory: RecordingFactory,
    replies: MockCommandReplyOutput,
    manager: ManagerWorker,
}

impl Fixture {
    async fn started() -> Self {
        let factory = RecordingFactory::default();
        let mut manager = ManagerWorker::new("manager-1", Box::new(factory.clone()));
        manager.on_start().await.unwrap();
        Self {
            factory,
            replies: MockCommandReplyOutput::new(),
            manager,
        }
    }

    async fn send(&mut self, command: Command) -> FleetResult<()> {
        let reply = ReplyCallback::new(command.clone(), Arc::new(self.replies.clone()));
        self.manager.process_command(command, reply).await
    }
}

fn start_command(correlation_id: &str, worker_id: &str) -> Command {
    StandardCommand::StartWorker {
        worker_id: worker_id.to_string(),
    }
    .with_correlation_id(correlation_id)
}

fn kill_command(correlation_id: &str, worker_id: &str) -> Command {
    StandardCommand::KillWorker {
        uuid: worker_id.to_string(),
    }
    .with_correlation_id(correlation_id)
}

#[tokio::test]
async fn test_start_worker_creates_and_starts_process() {
    let mut fixture = Fixture::started().await;
    assert_eq!(fixture.manager.state(), WorkerState::Running);

    fixture.send(start_command("1", "w-1")).await.unwrap();

    assert_eq!(fixture.factory.created(), vec!["w-1"]);
    assert_eq!(fixture.factory.handle("w-1").start_count(), 1);
    assert!(fixture.manager.has_worker("w-1"));

    let replies = fixture.replies.sent_replies();
    assert_eq!(replies.len(), 1);
    let (reply, is_reply) = &replies[0];
    assert_eq!(reply.correlation_id(), "1");
    assert_eq!(reply.status(), ReplyStatus::Success);
    assert_eq!(reply.message(), "worker started");
    assert_eq!(reply.data(), Some(&json!({ "worker_id": "w-1", "pid": 1000 })));
    assert!(*is_reply);
}

#[tokio::test]
async fn test_start_running_worker_is_refused() {
    let mut fixture = Fixture::started().await;
    fixture.send(start_command("1", "w-1")).await.unwrap();

    fixture.send(start_command("2", "w-1")).await.unwrap();

    assert_eq!(fixture.factory.created().len(), 1);
    let replies = fixture.replies.sent_replies();
    assert_eq!(replies.len(), 2);
    assert_eq!(replies[1].0.status(), ReplyStatus::Error);
    assert_eq!(replies[1].0.message(), "worker already running");
}

#[tokio::test]
async fn test_exited_worker_can_be_started_again() {
    let mut fixture = Fixture::started().await;
    fixture.send(start_command("1", "w-1")).await.unwrap();
    fixture.factory.handle("w-1").exit();

    fixture.send(start_command("2", "w-1")).await.unwrap();

    assert_eq!(fixture.factory.created().len(), 2);
    assert_eq!(fixture.replies.sent_replies()[1].0.message(), "worker started");
}

#[tokio::test]
async fn test_kill_worker() {
    let mut fixture = Fixture::started().await;
    fixture.send(start_command("1", "w-1")).await.unwrap();
    let handle = fixture.factory.handle("w-1");

    fixture.send(kill_command("2", "w-1")).await.unwrap();

    assert_eq!(handle.stop_count(), 1);
    assert!(!fixture.manager.has_worker("w-1"));
    let replies = fixture.replies.sent_replies();
    assert_eq!(replies[1].0.correlation_id(), "2");
    assert_eq!(replies[1].0.status(), ReplyStatus::Success);
    assert_eq!(replies[1].0.message(), "worker killed");
}

#[tokio::test]
async fn test_kill_unknown_worker() {
    let mut fixture = Fixture::started().await;

    fixture.send(kill_command("1", "ghost")).await.unwrap();

    let replies = fixture.replies.sent_replies();
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].0.status(), ReplyStatus::Error);
    assert_eq!(replies[0].0.message(), "worker not found");
}

#[tokio::test]
async fn test_unsupported_command_is_an_error() {
    let mut fixture = Fixture::started().await;

    let err = fixture
        .send(Command::new("1", "command.unknown"))
        .await
        .unwrap_err();

    assert!(matches!(err, FleetError::CommandProcessing(_)));
    assert!(fixture.replies.sent_replies().is_empty());
}

#[tokio::test]
async fn test_start_without_worker_id_is_an_error() {
    let mut fixture = Fixture::started().await;

    let err = fixture
        .send(Command::new("1", fleet_core::names::MANAGER_START))
        .await
        .unwrap_err();

    assert!(matches!(err, FleetError::Serialization(_)));
    assert!(fixture.factory.created().is_empty());
}

#[tokio::test]
async fn test_tick_forgets_exited_processes() {
    let mut fixture = Fixture::started().await;
    fixture.send(start_command("1", "w-1")).await.unwrap();
    fixture.send(start_command("2", "w-2")).await.unwrap();
    fixture.factory.handle("w-1").exit();

    fixture.manager.on_tick().await.unwrap();

    assert_eq!(fixture.manager.worker_ids(), vec!["w-2"]);
}

#[tokio::test]
async fn test_tick_keeps_process_when_probe_fails() {
    let mut fixture = Fixture::started().await;
    fixture.send(start_command("1", "w-1")).await.unwrap();
    fixture.factory.handle("w-1").fail_probe_with("probe failed");

    fixture.manager.on_tick().await.unwrap();

    assert!(fixture.manager.has_worker("w-1"));
}

#[tokio::test]
async fn test_stop_kills_all_processes() {
    let mut fixture = Fixture::started().await;
    fixture.send(start_command("1", "w-1")).await.unwrap();
    fixture.send(start_command("2", "w-2")).await.unwrap();

    fixture.manager.on_stop().await.unwrap();

    assert_eq!(fixture.factory.handle("w-1").stop_count(), 1);
    assert_eq!(fixture.factory.handle("w-2").stop_count(), 1);
    assert_eq!(fixture.manager.process_count(), 0);
    assert!(fixture.manager.is_stopped());
}

#[test]
fn test_command_line_factory_renders_template() {
    let factory = CommandLineProcessFactory::new(WorkerProcessTemplate {
        program: "worker".to_string(),
        args: vec!["--id".to_string(), "{id}".to_string()],
        working_dir: None,
        env: HashMap::new(),
    });

    assert!(factory.create("w-3").is_ok());
    assert_eq!(factory.template().render_args("w-3"), vec!["--id", "w-3"]);
}
