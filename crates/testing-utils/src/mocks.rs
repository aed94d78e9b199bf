//! Mock implementations for transport ports, process handles and workers
//!
//! Every mock is cheap to clone; clones share state, so a test keeps one
//! handle for assertions and hands another to the component under test.

use async_trait::async_trait;
use fleet_core::{
    Command, CommandInput, CommandOutput, CommandReply, CommandReplyInput, CommandReplyOutput,
    FleetError, FleetResult, ProcessHandle, ReplyCallback, Worker, WorkerState,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// A command recorded by [`MockCommandOutput`]
#[derive(Debug, Clone, PartialEq)]
pub struct SentCommand {
    pub topic: String,
    pub command: Command,
    pub is_reply: bool,
}

/// Mock implementation of CommandOutput
#[derive(Debug, Clone, Default)]
pub struct MockCommandOutput {
    sent: Arc<Mutex<Vec<SentCommand>>>,
    send_error: Arc<Mutex<Option<String>>>,
    close_error: Arc<Mutex<Option<String>>>,
    close_count: Arc<AtomicUsize>,
}

impl MockCommandOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every send fails with a transport error
    pub fn failing_with(message: &str) -> Self {
        let output = Self::new();
        *output.send_error.lock().unwrap() = Some(message.to_string());
        output
    }

    pub fn fail_close_with(&self, message: &str) {
        *self.close_error.lock().unwrap() = Some(message.to_string());
    }

    pub fn sent_commands(&self) -> Vec<SentCommand> {
        self.sent.lock().unwrap().clone()
    }

    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CommandOutput for MockCommandOutput {
    async fn send(&self, topic: &str, command: &Command, is_reply: bool) -> FleetResult<()> {
        if let Some(message) = self.send_error.lock().unwrap().clone() {
            return Err(FleetError::Transport(message));
        }
        self.sent.lock().unwrap().push(SentCommand {
            topic: topic.to_string(),
            command: command.clone(),
            is_reply,
        });
        Ok(())
    }

    async fn close(&self) -> FleetResult<()> {
        self.close_count.fetch_add(1, Ordering::SeqCst);
        match self.close_error.lock().unwrap().clone() {
            Some(message) => Err(FleetError::Transport(message)),
            None => Ok(()),
        }
    }
}

/// Scripted non-blocking input
///
/// Returns queued values in order (`None` entries simulate empty polls); once
/// the script is exhausted it keeps returning the repeat value, if any.
#[derive(Debug)]
pub struct ScriptedInput<T> {
    script: Arc<Mutex<VecDeque<Option<T>>>>,
    repeat: Arc<Mutex<Option<T>>>,
    receive_error: Arc<Mutex<Option<String>>>,
    close_error: Arc<Mutex<Option<String>>>,
    poll_count: Arc<AtomicUsize>,
    close_count: Arc<AtomicUsize>,
}

impl<T> Clone for ScriptedInput<T> {
    fn clone(&self) -> Self {
        Self {
            script: Arc::clone(&self.script),
            repeat: Arc::clone(&self.repeat),
            receive_error: Arc::clone(&self.receive_error),
            close_error: Arc::clone(&self.close_error),
            poll_count: Arc::clone(&self.poll_count),
            close_count: Arc::clone(&self.close_count),
        }
    }
}

impl<T> Default for ScriptedInput<T> {
    fn default() -> Self {
        Self {
            script: Arc::new(Mutex::new(VecDeque::new())),
            repeat: Arc::new(Mutex::new(None)),
            receive_error: Arc::new(Mutex::new(None)),
            close_error: Arc::new(Mutex::new(None)),
            poll_count: Arc::new(AtomicUsize::new(0)),
            close_count: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl<T: Clone> ScriptedInput<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, value: T) {
        self.script.lock().unwrap().push_back(Some(value));
    }

    /// Queue one empty poll
    pub fn push_empty(&self) {
        self.script.lock().unwrap().push_back(None);
    }

    /// Value returned on every poll after the script runs out
    pub fn repeat(&self, value: T) {
        *self.repeat.lock().unwrap() = Some(value);
    }

    /// Every poll fails with a transport error
    pub fn fail_receive_with(&self, message: &str) {
        *self.receive_error.lock().unwrap() = Some(message.to_string());
    }

    pub fn fail_close_with(&self, message: &str) {
        *self.close_error.lock().unwrap() = Some(message.to_string());
    }

    pub fn poll_count(&self) -> usize {
        self.poll_count.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }

    fn next(&self) -> FleetResult<Option<T>> {
        self.poll_count.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.receive_error.lock().unwrap().clone() {
            return Err(FleetError::Transport(message));
        }
        if let Some(entry) = self.script.lock().unwrap().pop_front() {
            return Ok(entry);
        }
        Ok(self.repeat.lock().unwrap().clone())
    }

    fn record_close(&self) -> FleetResult<()> {
        self.close_count.fetch_add(1, Ordering::SeqCst);
        match self.close_error.lock().unwrap().clone() {
            Some(message) => Err(FleetError::Transport(message)),
            None => Ok(()),
        }
    }
}

/// Mock implementation of CommandReplyInput
pub type MockCommandReplyInput = ScriptedInput<CommandReply>;

/// Mock implementation of CommandInput
pub type MockCommandInput = ScriptedInput<Command>;

#[async_trait]
impl CommandReplyInput for ScriptedInput<CommandReply> {
    async fn get_next(&self) -> FleetResult<Option<CommandReply>> {
        self.next()
    }

    async fn close(&self) -> FleetResult<()> {
        self.record_close()
    }
}

#[async_trait]
impl CommandInput for ScriptedInput<Command> {
    async fn get_next(&self) -> FleetResult<Option<Command>> {
        self.next()
    }

    async fn close(&self) -> FleetResult<()> {
        self.record_close()
    }
}

/// Mock implementation of CommandReplyOutput
#[derive(Debug, Clone, Default)]
pub struct MockCommandReplyOutput {
    sent: Arc<Mutex<Vec<(CommandReply, bool)>>>,
    send_error: Arc<Mutex<Option<String>>>,
    close_error: Arc<Mutex<Option<String>>>,
    close_count: Arc<AtomicUsize>,
}

impl MockCommandReplyOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_send_with(&self, message: &str) {
        *self.send_error.lock().unwrap() = Some(message.to_string());
    }

    pub fn fail_close_with(&self, message: &str) {
        *self.close_error.lock().unwrap() = Some(message.to_string());
    }

    /// Replies with their `is_reply` flag, in send order
    pub fn sent_replies(&self) -> Vec<(CommandReply, bool)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CommandReplyOutput for MockCommandReplyOutput {
    async fn send(&self, reply: &CommandReply, is_reply: bool) -> FleetResult<()> {
        if let Some(message) = self.send_error.lock().unwrap().clone() {
            return Err(FleetError::Transport(message));
        }
        self.sent.lock().unwrap().push((reply.clone(), is_reply));
        Ok(())
    }

    async fn close(&self) -> FleetResult<()> {
        self.close_count.fetch_add(1, Ordering::SeqCst);
        match self.close_error.lock().unwrap().clone() {
            Some(message) => Err(FleetError::Transport(message)),
            None => Ok(()),
        }
    }
}

/// Mock implementation of ProcessHandle
#[derive(Debug, Clone, Default)]
pub struct MockProcessHandle {
    running: Arc<AtomicBool>,
    start_count: Arc<AtomicUsize>,
    stop_count: Arc<AtomicUsize>,
    is_running_count: Arc<AtomicUsize>,
    start_error: Arc<Mutex<Option<String>>>,
    probe_error: Arc<Mutex<Option<String>>>,
    pid: Option<u32>,
}

impl MockProcessHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = Some(pid);
        self
    }

    pub fn fail_start_with(&self, message: &str) {
        *self.start_error.lock().unwrap() = Some(message.to_string());
    }

    pub fn fail_probe_with(&self, message: &str) {
        *self.probe_error.lock().unwrap() = Some(message.to_string());
    }

    /// Simulate the OS process exiting on its own
    pub fn exit(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    pub fn start_count(&self) -> usize {
        self.start_count.load(Ordering::SeqCst)
    }

    pub fn stop_count(&self) -> usize {
        self.stop_count.load(Ordering::SeqCst)
    }

    pub fn is_running_count(&self) -> usize {
        self.is_running_count.load(Ordering::SeqCst)
    }
}

impl ProcessHandle for MockProcessHandle {
    fn start(&mut self) -> FleetResult<()> {
        self.start_count.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.start_error.lock().unwrap().clone() {
            return Err(FleetError::Process(message));
        }
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) -> FleetResult<()> {
        self.stop_count.fetch_add(1, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_running(&mut self) -> FleetResult<bool> {
        self.is_running_count.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.probe_error.lock().unwrap().clone() {
            return Err(FleetError::Process(message));
        }
        Ok(self.running.load(Ordering::SeqCst))
    }

    fn pid(&self) -> Option<u32> {
        self.pid
    }
}

/// How [`MockWorker`] reacts to a command
#[derive(Debug, Clone, PartialEq)]
pub enum CommandBehavior {
    /// Reply success with message `done`
    Reply,
    /// Accept the command without replying
    Ignore,
    /// Return a command processing error
    Fail(String),
    /// Panic inside `process_command`
    Panic(String),
}

/// Calls observed by [`MockWorker`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkerCalls {
    pub start: usize,
    pub tick: usize,
    pub stop: usize,
    pub commands: Vec<Command>,
}

/// Mock implementation of Worker
#[derive(Debug, Clone)]
pub struct MockWorker {
    uuid: String,
    state: WorkerState,
    calls: Arc<Mutex<WorkerCalls>>,
    behavior: CommandBehavior,
    start_error: Option<String>,
    tick_error: Option<String>,
    stop_error: Option<String>,
}

impl MockWorker {
    pub fn new(uuid: &str) -> Self {
        Self {
            uuid: uuid.to_string(),
            state: WorkerState::NotStarted,
            calls: Arc::new(Mutex::new(WorkerCalls::default())),
            behavior: CommandBehavior::Reply,
            start_error: None,
            tick_error: None,
            stop_error: None,
        }
    }

    pub fn with_behavior(mut self, behavior: CommandBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn failing_start(mut self, message: &str) -> Self {
        self.start_error = Some(message.to_string());
        self
    }

    pub fn failing_tick(mut self, message: &str) -> Self {
        self.tick_error = Some(message.to_string());
        self
    }

    pub fn failing_stop(mut self, message: &str) -> Self {
        self.stop_error = Some(message.to_string());
        self
    }

    /// Shared view of the calls, usable after the worker moved into a runner
    pub fn calls_handle(&self) -> Arc<Mutex<WorkerCalls>> {
        Arc::clone(&self.calls)
    }

    pub fn calls(&self) -> WorkerCalls {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Worker for MockWorker {
    fn uuid(&self) -> &str {
        &self.uuid
    }

    fn state(&self) -> WorkerState {
        self.state
    }

    async fn on_start(&mut self) -> FleetResult<()> {
        self.calls.lock().unwrap().start += 1;
        if let Some(message) = &self.start_error {
            return Err(FleetError::Internal(message.clone()));
        }
        self.state = WorkerState::Running;
        Ok(())
    }

    async fn on_tick(&mut self) -> FleetResult<()> {
        self.calls.lock().unwrap().tick += 1;
        match &self.tick_error {
            Some(message) => Err(FleetError::Internal(message.clone())),
            None => Ok(()),
        }
    }

    async fn on_stop(&mut self) -> FleetResult<()> {
        self.calls.lock().unwrap().stop += 1;
        self.state = WorkerState::Stopped;
        match &self.stop_error {
            Some(message) => Err(FleetError::Internal(message.clone())),
            None => Ok(()),
        }
    }

    async fn process_command(&mut self, command: Command, reply: ReplyCallback) -> FleetResult<()> {
        self.calls.lock().unwrap().commands.push(command.clone());
        match &self.behavior {
            CommandBehavior::Reply => {
                reply
                    .send(CommandReply::success(command.correlation_id(), "done"))
                    .await
            }
            CommandBehavior::Ignore => Ok(()),
            CommandBehavior::Fail(message) => Err(FleetError::CommandProcessing(message.clone())),
            CommandBehavior::Panic(message) => panic!("{}", message),
        }
    }
}
