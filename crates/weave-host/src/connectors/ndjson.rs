//! Newline-delimited JSON transport. Each line is one frame; requests carry
//! an id that the server echoes on every frame it sends in reply.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use futures::StreamExt;
use futures::channel::mpsc;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tracing::{debug, warn};
use weave_commands::{CommandEnvelope, CommandId, EventEnvelope, KernelInfo};

use super::traits::{ConnectorError, EventStream, KernelConnector};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientFrame {
    KernelInfo { id: u64 },
    Command { id: u64, envelope: CommandEnvelope },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerFrame {
    KernelInfo { id: u64, info: KernelInfo },
    Event { id: u64, envelope: EventEnvelope },
    Error { id: u64, message: String },
}

impl ServerFrame {
    pub fn id(&self) -> u64 {
        match self {
            ServerFrame::KernelInfo { id, .. }
            | ServerFrame::Event { id, .. }
            | ServerFrame::Error { id, .. } => *id,
        }
    }
}

/// Serialize `frame` as one line.
pub async fn write_frame<W, T>(writer: &mut W, frame: &T) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
    T: Serialize,
{
    let mut line = serde_json::to_vec(frame)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await
}

enum Pending {
    Info(oneshot::Sender<Result<KernelInfo, ConnectorError>>),
    Command {
        command: CommandId,
        events: mpsc::UnboundedSender<Result<EventEnvelope, ConnectorError>>,
    },
}

#[derive(Default)]
struct PendingRequests {
    requests: HashMap<u64, Pending>,
    closed: bool,
}

type PendingMap = Arc<Mutex<PendingRequests>>;
type FrameWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Client side of the NDJSON transport. A reader task routes server frames
/// to the request that caused them; when the connection closes, every
/// outstanding request ends.
pub struct NdjsonConnector {
    uri: String,
    writer: tokio::sync::Mutex<FrameWriter>,
    pending: PendingMap,
    next_id: AtomicU64,
    _child: Option<Child>,
}

impl NdjsonConnector {
    pub fn new<R, W>(uri: impl Into<String>, reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let uri = uri.into();
        let pending: PendingMap = Arc::default();
        tokio::spawn(read_frames(uri.clone(), reader, pending.clone()));
        Self {
            uri,
            writer: tokio::sync::Mutex::new(Box::new(writer)),
            pending,
            next_id: AtomicU64::new(1),
            _child: None,
        }
    }

    /// Launch `command` with piped stdio and talk to it over its stdin and
    /// stdout. The process is killed when the connector is dropped.
    pub fn spawn(uri: impl Into<String>, mut command: Command) -> Result<Self, ConnectorError> {
        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;
        let uri = uri.into();
        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(ConnectorError::Closed(uri));
        };
        let mut connector = Self::new(uri, stdout, stdin);
        connector._child = Some(child);
        Ok(connector)
    }

    fn register(&self, pending: Pending) -> Result<u64, ConnectorError> {
        let mut state = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if state.closed {
            return Err(ConnectorError::Closed(self.uri.clone()));
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        state.requests.insert(id, pending);
        Ok(id)
    }

    async fn write(&self, id: u64, frame: &ClientFrame) -> Result<(), ConnectorError> {
        let mut writer = self.writer.lock().await;
        if let Err(err) = write_frame(&mut *writer, frame).await {
            self.pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .requests
                .remove(&id);
            return Err(err.into());
        }
        Ok(())
    }
}

#[async_trait]
impl KernelConnector for NdjsonConnector {
    fn uri(&self) -> &str {
        &self.uri
    }

    async fn kernel_info(&self) -> Result<KernelInfo, ConnectorError> {
        let (tx, rx) = oneshot::channel();
        let id = self.register(Pending::Info(tx))?;
        self.write(id, &ClientFrame::KernelInfo { id }).await?;
        rx.await
            .map_err(|_| ConnectorError::Closed(self.uri.clone()))?
    }

    async fn send(&self, envelope: CommandEnvelope) -> Result<EventStream, ConnectorError> {
        let (tx, rx) = mpsc::unbounded();
        let id = self.register(Pending::Command {
            command: envelope.command.id(),
            events: tx,
        })?;
        debug!(uri = %self.uri, id, command = %envelope.command, "forwarding command");
        self.write(id, &ClientFrame::Command { id, envelope }).await?;
        Ok(rx.boxed())
    }
}

async fn read_frames<R>(uri: String, reader: R, pending: PendingMap)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => continue,
            Ok(Some(line)) => match serde_json::from_str::<ServerFrame>(&line) {
                Ok(frame) => dispatch(&pending, frame),
                Err(err) => warn!(%uri, error = %err, "dropping undecodable frame"),
            },
            Ok(None) => break,
            Err(err) => {
                warn!(%uri, error = %err, "connection read failed");
                break;
            }
        }
    }
    debug!(%uri, "connection closed");
    let mut state = pending.lock().unwrap_or_else(PoisonError::into_inner);
    state.closed = true;
    // Dropping the senders ends every outstanding stream.
    state.requests.clear();
}

fn dispatch(pending: &PendingMap, frame: ServerFrame) {
    let mut state = pending.lock().unwrap_or_else(PoisonError::into_inner);
    let pending = &mut state.requests;
    let id = frame.id();
    let Some(entry) = pending.remove(&id) else {
        warn!(id, "frame for unknown request");
        return;
    };
    match (entry, frame) {
        (Pending::Info(tx), ServerFrame::KernelInfo { info, .. }) => {
            let _ = tx.send(Ok(info));
        }
        (Pending::Info(tx), ServerFrame::Error { message, .. }) => {
            let _ = tx.send(Err(ConnectorError::Remote(message)));
        }
        (Pending::Command { command, events }, ServerFrame::Event { envelope, .. }) => {
            let done = envelope.event.is_terminal() && envelope.command.id() == command;
            let _ = events.unbounded_send(Ok(envelope));
            if !done {
                pending.insert(id, Pending::Command { command, events });
            }
        }
        (Pending::Command { events, .. }, ServerFrame::Error { message, .. }) => {
            let _ = events.unbounded_send(Err(ConnectorError::Remote(message)));
        }
        (entry, _) => {
            warn!(id, "unexpected frame for request");
            pending.insert(id, entry);
        }
    }
}
