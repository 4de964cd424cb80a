use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;
use weave_commands::{CommandEnvelope, EventEnvelope, KernelInfo};

/// Events for one forwarded command. The stream ends after the command's
/// terminal event, or early if the transport goes away.
pub type EventStream = BoxStream<'static, Result<EventEnvelope, ConnectorError>>;

#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("connection to '{0}' closed")]
    Closed(String),
    /// Error reported by the remote side, passed through verbatim.
    #[error("{0}")]
    Remote(String),
    #[error("unsupported protocol version {found} (expected {expected})")]
    ProtocolVersion { expected: u8, found: u8 },
}

/// Transport to a kernel living outside this process.
#[async_trait]
pub trait KernelConnector: Send + Sync {
    fn uri(&self) -> &str;

    async fn kernel_info(&self) -> Result<KernelInfo, ConnectorError>;

    async fn send(&self, command: CommandEnvelope) -> Result<EventStream, ConnectorError>;
}
