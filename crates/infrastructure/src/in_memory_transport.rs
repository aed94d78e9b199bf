use async_trait::async_trait;
use fleet_core::{
    Command, CommandInput, CommandOutput, CommandReply, CommandReplyInput, CommandReplyOutput,
    FleetError, FleetResult,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, info};

/// 内存命令总线
///
/// 使用 Tokio channels 在同一进程内连接Manager侧和Worker侧，适用于嵌入式部署和测试。
/// 每个主题一条无界命令队列，所有回复共用一条回复队列；读取端都是非阻塞的。
#[derive(Debug, Clone)]
pub struct InMemoryCommandBus {
    inner: Arc<BusInner>,
}

#[derive(Debug)]
struct BusInner {
    /// 主题名 -> 命令队列
    topics: RwLock<HashMap<String, TopicChannel>>,
    reply_sender: mpsc::UnboundedSender<CommandReply>,
    reply_receiver: Mutex<mpsc::UnboundedReceiver<CommandReply>>,
}

#[derive(Debug)]
struct TopicChannel {
    sender: mpsc::UnboundedSender<Command>,
    /// 主题的读取端只能被取走一次
    receiver: Option<mpsc::UnboundedReceiver<Command>>,
}

impl TopicChannel {
    fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Some(receiver),
        }
    }
}

impl Default for InMemoryCommandBus {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCommandBus {
    pub fn new() -> Self {
        let (reply_sender, reply_receiver) = mpsc::unbounded_channel();
        info!("创建内存命令总线");
        Self {
            inner: Arc::new(BusInner {
                topics: RwLock::new(HashMap::new()),
                reply_sender,
                reply_receiver: Mutex::new(reply_receiver),
            }),
        }
    }

    /// Manager侧命令发送端
    pub fn command_output(&self) -> InMemoryCommandOutput {
        InMemoryCommandOutput {
            bus: Arc::clone(&self.inner),
            closed: AtomicBool::new(false),
        }
    }

    /// Manager侧回复读取端
    pub fn reply_input(&self) -> InMemoryCommandReplyInput {
        InMemoryCommandReplyInput {
            bus: Arc::clone(&self.inner),
            closed: AtomicBool::new(false),
        }
    }

    /// Worker侧命令读取端，每个主题只允许挂接一次
    pub async fn command_input(&self, topic: &str) -> FleetResult<InMemoryCommandInput> {
        let mut topics = self.inner.topics.write().await;
        let channel = topics
            .entry(topic.to_string())
            .or_insert_with(TopicChannel::new);

        let receiver = channel.receiver.take().ok_or_else(|| {
            FleetError::Transport(format!("主题已有命令读取端: {topic}"))
        })?;

        debug!(topic, "挂接命令读取端");
        Ok(InMemoryCommandInput {
            topic: topic.to_string(),
            receiver: Mutex::new(receiver),
            closed: AtomicBool::new(false),
        })
    }

    /// Worker侧回复发送端
    pub fn reply_output(&self) -> InMemoryCommandReplyOutput {
        InMemoryCommandReplyOutput {
            sender: self.inner.reply_sender.clone(),
            closed: AtomicBool::new(false),
        }
    }

    /// 已创建的主题
    pub async fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.inner.topics.read().await.keys().cloned().collect();
        topics.sort();
        topics
    }
}

fn closed_error(endpoint: &str) -> FleetError {
    FleetError::Transport(format!("{endpoint}已关闭"))
}

#[derive(Debug)]
pub struct InMemoryCommandOutput {
    bus: Arc<BusInner>,
    closed: AtomicBool,
}

#[async_trait]
impl CommandOutput for InMemoryCommandOutput {
    async fn send(&self, topic: &str, command: &Command, is_reply: bool) -> FleetResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(closed_error("命令发送端"));
        }

        let sender = {
            let topics = self.bus.topics.read().await;
            topics.get(topic).map(|channel| channel.sender.clone())
        };
        let sender = match sender {
            Some(sender) => sender,
            None => {
                let mut topics = self.bus.topics.write().await;
                topics
                    .entry(topic.to_string())
                    .or_insert_with(TopicChannel::new)
                    .sender
                    .clone()
            }
        };

        sender
            .send(command.clone())
            .map_err(|_| FleetError::Transport(format!("主题读取端已关闭: {topic}")))?;

        debug!(topic, command = %command, is_reply, "命令已入队");
        Ok(())
    }

    async fn close(&self) -> FleetResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug)]
pub struct InMemoryCommandReplyInput {
    bus: Arc<BusInner>,
    closed: AtomicBool,
}

#[async_trait]
impl CommandReplyInput for InMemoryCommandReplyInput {
    async fn get_next(&self) -> FleetResult<Option<CommandReply>> {
        if self.closed.load(Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(self.bus.reply_receiver.lock().await.try_recv().ok())
    }

    async fn close(&self) -> FleetResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug)]
pub struct InMemoryCommandInput {
    topic: String,
    receiver: Mutex<mpsc::UnboundedReceiver<Command>>,
    closed: AtomicBool,
}

impl InMemoryCommandInput {
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

#[async_trait]
impl CommandInput for InMemoryCommandInput {
    async fn get_next(&self) -> FleetResult<Option<Command>> {
        if self.closed.load(Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(self.receiver.lock().await.try_recv().ok())
    }

    async fn close(&self) -> FleetResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.receiver.lock().await.close();
        debug!(topic = %self.topic, "命令读取端已关闭");
        Ok(())
    }
}

#[derive(Debug)]
pub struct InMemoryCommandReplyOutput {
    sender: mpsc::UnboundedSender<CommandReply>,
    closed: AtomicBool,
}

#[async_trait]
impl CommandReplyOutput for InMemoryCommandReplyOutput {
    async fn send(&self, reply: &CommandReply, is_reply: bool) -> FleetResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(closed_error("回复发送端"));
        }

        self.sender
            .send(reply.clone())
            .map_err(|_| FleetError::Transport("回复队列已关闭".to_string()))?;

        debug!(correlation_id = reply.correlation_id(), is_reply, "回复已入队");
        Ok(())
    }

    async fn close(&self) -> FleetResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
