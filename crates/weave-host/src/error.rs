use thiserror::Error;
use weave_kernel::KernelError;

use crate::connectors::ConnectorError;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("kernel error: {0}")]
    Kernel(#[from] KernelError),
    #[error("connector error: {0}")]
    Connector(#[from] ConnectorError),
    #[error("no connector registered for '{0}'")]
    NoConnector(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
}
