//! 本地套接字命令传输
//!
//! Manager进程在 `<socket_dir>/<manager_id>.sock` 上监听，命令行进程连接后发送命令并等待回复，
//! 使启停Worker的命令能够到达另一个进程中运行的Manager。
//!
//! 帧格式：4字节大端长度 + JSON正文。命令和回复各自一帧。
//! 服务端按关联ID记录命令来自哪个连接，回复沿原连接写回。

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fleet_core::{
    Command, CommandInput, CommandOutput, CommandReply, CommandReplyInput, CommandReplyOutput,
    FleetError, FleetResult,
};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// 单帧最大长度
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// 主题对应的套接字文件
pub fn socket_path(socket_dir: &Path, topic: &str) -> PathBuf {
    socket_dir.join(format!("{topic}.sock"))
}

async fn write_frame<W>(writer: &mut W, body: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    if body.len() > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("帧长度超出上限: {}", body.len()),
        ));
    }
    writer.write_u32(body.len() as u32).await?;
    writer.write_all(body).await?;
    writer.flush().await
}

async fn read_frame<R>(reader: &mut R) -> io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let len = reader.read_u32().await? as usize;
    if len > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("帧长度超出上限: {len}"),
        ));
    }
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}

fn transport_error(context: &str, e: impl std::fmt::Display) -> FleetError {
    FleetError::Transport(format!("{context}: {e}"))
}

/// 关联ID -> 命令来源连接的回复队列
type ReplyRoutes = std::sync::Mutex<HashMap<String, mpsc::UnboundedSender<CommandReply>>>;

fn lock_routes(
    routes: &ReplyRoutes,
) -> std::sync::MutexGuard<'_, HashMap<String, mpsc::UnboundedSender<CommandReply>>> {
    routes.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Manager侧套接字服务
pub struct SocketCommandServer {
    path: PathBuf,
    commands: mpsc::UnboundedReceiver<Command>,
    routes: Arc<ReplyRoutes>,
    accept_task: JoinHandle<()>,
}

impl SocketCommandServer {
    /// 监听套接字文件，遗留的同名文件会先被删除
    pub async fn bind(path: impl AsRef<Path>) -> FleetResult<Self> {
        let path = path.as_ref().to_path_buf();
        if path.exists() {
            std::fs::remove_file(&path)?;
        }

        let listener = UnixListener::bind(&path)
            .map_err(|e| transport_error(&format!("监听套接字失败 {}", path.display()), e))?;

        let (command_tx, commands) = mpsc::unbounded_channel();
        let routes: Arc<ReplyRoutes> = Arc::new(std::sync::Mutex::new(HashMap::new()));
        let accept_task = tokio::spawn(accept_loop(listener, command_tx, Arc::clone(&routes)));

        info!(path = %path.display(), "命令套接字已监听");
        Ok(Self {
            path,
            commands,
            routes,
            accept_task,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 拆分为Worker侧的命令读取端和回复发送端
    pub fn into_ports(self) -> (SocketCommandInput, SocketCommandReplyOutput) {
        let input = SocketCommandInput {
            path: self.path,
            receiver: Mutex::new(self.commands),
            accept_task: self.accept_task,
            closed: AtomicBool::new(false),
        };
        let output = SocketCommandReplyOutput {
            routes: self.routes,
            closed: AtomicBool::new(false),
        };
        (input, output)
    }
}

async fn accept_loop(
    listener: UnixListener,
    command_tx: mpsc::UnboundedSender<Command>,
    routes: Arc<ReplyRoutes>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                debug!("接受命令连接");
                tokio::spawn(serve_connection(
                    stream,
                    command_tx.clone(),
                    Arc::clone(&routes),
                ));
            }
            Err(e) => {
                error!(error = %e, "接受命令连接失败");
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}

async fn serve_connection(
    stream: UnixStream,
    command_tx: mpsc::UnboundedSender<Command>,
    routes: Arc<ReplyRoutes>,
) {
    let (mut reader, mut writer) = stream.into_split();
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<CommandReply>();

    tokio::spawn(async move {
        while let Some(reply) = reply_rx.recv().await {
            let body = match reply.to_json() {
                Ok(body) => body,
                Err(e) => {
                    error!(correlation_id = reply.correlation_id(), error = %e, "序列化回复失败");
                    continue;
                }
            };
            if let Err(e) = write_frame(&mut writer, body.as_bytes()).await {
                warn!(correlation_id = reply.correlation_id(), error = %e, "写回复失败，连接已断开");
                break;
            }
        }
    });

    loop {
        let frame = match read_frame(&mut reader).await {
            Ok(frame) => frame,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => {
                warn!(error = %e, "读取命令帧失败，关闭连接");
                break;
            }
        };

        let command = match std::str::from_utf8(&frame)
            .map_err(|e| FleetError::Serialization(e.to_string()))
            .and_then(Command::from_json)
        {
            Ok(command) => command,
            Err(e) => {
                warn!(error = %e, "无法解析命令帧，忽略");
                continue;
            }
        };

        lock_routes(&routes).insert(command.correlation_id().to_string(), reply_tx.clone());
        debug!(command = %command, "命令已接收");

        if command_tx.send(command).is_err() {
            debug!("命令读取端已关闭，断开连接");
            break;
        }
    }

    // 连接断开后其未回复的路由作废
    lock_routes(&routes).retain(|_, sender| !sender.same_channel(&reply_tx));
    debug!("命令连接已关闭");
}

#[derive(Debug)]
pub struct SocketCommandInput {
    path: PathBuf,
    receiver: Mutex<mpsc::UnboundedReceiver<Command>>,
    accept_task: JoinHandle<()>,
    closed: AtomicBool,
}

impl SocketCommandInput {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CommandInput for SocketCommandInput {
    async fn get_next(&self) -> FleetResult<Option<Command>> {
        if self.closed.load(Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(self.receiver.lock().await.try_recv().ok())
    }

    /// 停止监听并删除套接字文件
    async fn close(&self) -> FleetResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.accept_task.abort();
        self.receiver.lock().await.close();

        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        info!(path = %self.path.display(), "命令套接字已关闭");
        Ok(())
    }
}

#[derive(Debug)]
pub struct SocketCommandReplyOutput {
    routes: Arc<ReplyRoutes>,
    closed: AtomicBool,
}

#[async_trait]
impl CommandReplyOutput for SocketCommandReplyOutput {
    async fn send(&self, reply: &CommandReply, is_reply: bool) -> FleetResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(FleetError::Transport("回复发送端已关闭".to_string()));
        }

        let sender = lock_routes(&self.routes)
            .remove(reply.correlation_id())
            .ok_or_else(|| {
                FleetError::Transport(format!(
                    "回复没有对应的连接: {}",
                    reply.correlation_id()
                ))
            })?;

        sender
            .send(reply.clone())
            .map_err(|_| FleetError::Transport("命令连接已断开".to_string()))?;

        debug!(correlation_id = reply.correlation_id(), is_reply, "回复已写回连接");
        Ok(())
    }

    async fn close(&self) -> FleetResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        lock_routes(&self.routes).clear();
        Ok(())
    }
}

/// 命令行侧套接字客户端
///
/// 每个主题在首次发送时建立连接，所有连接上的回复汇入同一条回复队列。
#[derive(Debug, Clone)]
pub struct SocketCommandClient {
    inner: Arc<ClientInner>,
}

#[derive(Debug)]
struct ClientInner {
    socket_dir: PathBuf,
    connections: Mutex<HashMap<String, OwnedWriteHalf>>,
    reply_sender: mpsc::UnboundedSender<CommandReply>,
    reply_receiver: Mutex<mpsc::UnboundedReceiver<CommandReply>>,
}

impl SocketCommandClient {
    pub fn new(socket_dir: impl Into<PathBuf>) -> Self {
        let (reply_sender, reply_receiver) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(ClientInner {
                socket_dir: socket_dir.into(),
                connections: Mutex::new(HashMap::new()),
                reply_sender,
                reply_receiver: Mutex::new(reply_receiver),
            }),
        }
    }

    pub fn command_output(&self) -> SocketCommandOutput {
        SocketCommandOutput {
            client: Arc::clone(&self.inner),
            closed: AtomicBool::new(false),
        }
    }

    pub fn reply_input(&self) -> SocketCommandReplyInput {
        SocketCommandReplyInput {
            client: Arc::clone(&self.inner),
            closed: AtomicBool::new(false),
        }
    }
}

impl ClientInner {
    async fn connect(&self, topic: &str) -> FleetResult<OwnedWriteHalf> {
        let path = socket_path(&self.socket_dir, topic);
        let stream = UnixStream::connect(&path)
            .await
            .map_err(|e| transport_error(&format!("连接Manager失败 {}", path.display()), e))?;

        let (mut reader, writer) = stream.into_split();
        let reply_sender = self.reply_sender.clone();
        let topic = topic.to_string();

        tokio::spawn(async move {
            loop {
                let frame = match read_frame(&mut reader).await {
                    Ok(frame) => frame,
                    Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                    Err(e) => {
                        warn!(topic = %topic, error = %e, "读取回复帧失败");
                        break;
                    }
                };

                match std::str::from_utf8(&frame)
                    .map_err(|e| FleetError::Serialization(e.to_string()))
                    .and_then(CommandReply::from_json)
                {
                    Ok(reply) => {
                        if reply_sender.send(reply).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(topic = %topic, error = %e, "无法解析回复帧，忽略"),
                }
            }
            debug!(topic = %topic, "回复连接已关闭");
        });

        debug!(path = %path.display(), "已连接Manager");
        Ok(writer)
    }
}

#[derive(Debug)]
pub struct SocketCommandOutput {
    client: Arc<ClientInner>,
    closed: AtomicBool,
}

#[async_trait]
impl CommandOutput for SocketCommandOutput {
    async fn send(&self, topic: &str, command: &Command, is_reply: bool) -> FleetResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(FleetError::Transport("命令发送端已关闭".to_string()));
        }

        let body = command.to_json()?;
        let mut connections = self.client.connections.lock().await;

        if !connections.contains_key(topic) {
            let writer = self.client.connect(topic).await?;
            connections.insert(topic.to_string(), writer);
        }

        if let Some(writer) = connections.get_mut(topic) {
            if let Err(e) = write_frame(writer, body.as_bytes()).await {
                connections.remove(topic);
                return Err(transport_error("发送命令失败", e));
            }
        }

        debug!(topic, command = %command, is_reply, "命令已写入套接字");
        Ok(())
    }

    /// 断开所有连接
    async fn close(&self) -> FleetResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.client.connections.lock().await.clear();
        Ok(())
    }
}

#[derive(Debug)]
pub struct SocketCommandReplyInput {
    client: Arc<ClientInner>,
    closed: AtomicBool,
}

#[async_trait]
impl CommandReplyInput for SocketCommandReplyInput {
    async fn get_next(&self) -> FleetResult<Option<CommandReply>> {
        if self.closed.load(Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(self.client.reply_receiver.lock().await.try_recv().ok())
    }

    async fn close(&self) -> FleetResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
