use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use weave_commands::{KernelCommand, PROTOCOL_VERSION};
use weave_kernel::CompositeKernel;

use crate::connectors::loopback::to_envelope;
use crate::connectors::ndjson::{ClientFrame, ServerFrame, write_frame};
use crate::error::HostError;

type FrameSender = mpsc::UnboundedSender<ServerFrame>;

/// Serves a composite kernel over the NDJSON transport.
///
/// Every command runs in its own task, so commands for different kernels
/// progress independently while each kernel keeps its own order. Events are
/// written as they are published; one writer owns the output so frames never
/// interleave.
pub struct KernelServer {
    kernel: CompositeKernel,
}

impl KernelServer {
    pub fn new(kernel: CompositeKernel) -> Self {
        Self { kernel }
    }

    /// Run until the reader reaches end of input and every accepted command
    /// has finished.
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> Result<(), HostError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let (frames_tx, mut frames) = mpsc::unbounded_channel();
        let mut accepting = Some(frames_tx);
        let mut lines = BufReader::new(reader).lines();
        loop {
            tokio::select! {
                line = lines.next_line(), if accepting.is_some() => {
                    match line? {
                        Some(line) => {
                            if let Some(tx) = &accepting {
                                self.accept(&line, tx);
                            }
                        }
                        None => {
                            debug!(kernel = self.kernel.name(), "client closed its side");
                            accepting = None;
                        }
                    }
                }
                Some(frame) = frames.recv() => write_frame(&mut writer, &frame).await?,
                else => break,
            }
        }
        debug!(kernel = self.kernel.name(), "client disconnected");
        Ok(())
    }

    fn accept(&self, line: &str, frames: &FrameSender) {
        if line.trim().is_empty() {
            return;
        }
        let frame = match serde_json::from_str::<ClientFrame>(line) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(error = %err, "rejecting undecodable request");
                let _ = frames.send(ServerFrame::Error {
                    id: 0,
                    message: format!("invalid request: {err}"),
                });
                return;
            }
        };
        match frame {
            ClientFrame::KernelInfo { id } => {
                let _ = frames.send(ServerFrame::KernelInfo {
                    id,
                    info: self.kernel.info(),
                });
            }
            ClientFrame::Command { id, envelope } if envelope.v != PROTOCOL_VERSION => {
                let _ = frames.send(ServerFrame::Error {
                    id,
                    message: format!(
                        "unsupported protocol version {} (expected {PROTOCOL_VERSION})",
                        envelope.v
                    ),
                });
            }
            ClientFrame::Command { id, envelope } => {
                debug!(id, command = %envelope.command, "handling remote command");
                tokio::spawn(stream_command(
                    self.kernel.clone(),
                    id,
                    envelope.command,
                    frames.clone(),
                ));
            }
        }
    }
}

/// Send `command` and forward its progress events while it runs. Whatever
/// the live subscription missed is taken from the final result, followed by
/// the terminal event.
async fn stream_command(
    kernel: CompositeKernel,
    id: u64,
    command: KernelCommand,
    frames: FrameSender,
) {
    let command_id = command.id();
    let mut live = kernel.subscribe();
    let send = kernel.send(command);
    tokio::pin!(send);

    // Events received before any lag arrive in publish order, so the ones
    // forwarded here are a prefix of the command's progress events.
    let mut streamed = 0usize;
    let mut following = true;
    let result = loop {
        tokio::select! {
            result = &mut send => break result,
            event = live.recv(), if following => match event {
                Ok(event) if event.command().id() == command_id && !event.is_terminal() => {
                    streamed += 1;
                    let _ = frames.send(ServerFrame::Event {
                        id,
                        envelope: to_envelope(&event),
                    });
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(id, skipped, "event subscription lagged; sending the rest on completion");
                    following = false;
                }
                Err(RecvError::Closed) => following = false,
            },
        }
    };

    let mut progress = 0usize;
    for event in result.events() {
        if event.command().id() == command_id && !event.is_terminal() {
            progress += 1;
            if progress <= streamed {
                continue;
            }
        }
        let _ = frames.send(ServerFrame::Event {
            id,
            envelope: to_envelope(event),
        });
    }
}
