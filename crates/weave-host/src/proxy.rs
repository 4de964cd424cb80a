use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tracing::debug;
use weave_commands::{CommandEnvelope, Event, KernelInfo};
use weave_kernel::{Kernel, KernelError, KernelInvocationContext};

use crate::connectors::{ConnectorError, KernelConnector};

/// Forwards every command it receives to a remote kernel and republishes the
/// remote events locally under its own name.
pub struct ProxyKernel {
    info: KernelInfo,
    connector: Arc<dyn KernelConnector>,
    remote_target: Option<String>,
    timeout: Option<Duration>,
}

impl ProxyKernel {
    pub fn new(info: KernelInfo, connector: Arc<dyn KernelConnector>) -> Self {
        Self {
            info,
            connector,
            remote_target: None,
            timeout: None,
        }
    }

    /// Ask the remote side what it is and mirror its language, runtime, and
    /// capabilities under `name`.
    pub async fn connect(
        name: impl Into<String>,
        connector: Arc<dyn KernelConnector>,
    ) -> Result<Self, ConnectorError> {
        let remote = connector.kernel_info().await?;
        let mut info = KernelInfo::new(name).with_commands(remote.supported_commands);
        info.language_name = remote.language_name;
        info.runtime = remote.runtime;
        Ok(Self::new(info, connector))
    }

    /// Name the remote kernel to address. Unset, the remote side picks.
    pub fn with_remote_target(mut self, name: impl Into<String>) -> Self {
        self.remote_target = Some(name.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    async fn forward(&self, ctx: &mut KernelInvocationContext) -> Result<(), KernelError> {
        let command = ctx.command().clone();
        let envelope = CommandEnvelope::new(command.for_remote(self.remote_target.clone()));
        let mut events = self
            .connector
            .send(envelope)
            .await
            .map_err(connector_error)?;

        while let Some(envelope) = events.next().await {
            let envelope = envelope.map_err(connector_error)?;
            if envelope.command.id() != command.id() {
                ctx.publish_for(Arc::new(envelope.command), envelope.event);
                continue;
            }
            match envelope.event {
                Event::CommandSucceeded => return Ok(()),
                Event::CommandFailed(failed) if failed.cancelled => {
                    return Err(KernelError::Cancelled);
                }
                Event::CommandFailed(failed) => return Err(KernelError::Remote(failed.message)),
                event => ctx.publish(event),
            }
        }
        Err(KernelError::Transport(format!(
            "connection to '{}' closed before the command completed",
            self.connector.uri()
        )))
    }
}

fn connector_error(err: ConnectorError) -> KernelError {
    match err {
        ConnectorError::Remote(message) => KernelError::Remote(message),
        other => KernelError::Transport(other.to_string()),
    }
}

#[async_trait]
impl Kernel for ProxyKernel {
    fn info(&self) -> &KernelInfo {
        &self.info
    }

    async fn handle(&mut self, ctx: &mut KernelInvocationContext) -> Result<(), KernelError> {
        debug!(kernel = %self.info.name, uri = self.connector.uri(), command = %ctx.command(), "proxying");
        let cancellation = ctx.cancellation().clone();
        let timeout = self.timeout;
        let uri = self.connector.uri().to_string();
        let forward = self.forward(ctx);
        tokio::select! {
            result = async {
                match timeout {
                    Some(limit) => tokio::time::timeout(limit, forward).await.unwrap_or_else(|_| {
                        Err(KernelError::Transport(format!(
                            "no response from '{uri}' within {limit:?}"
                        )))
                    }),
                    None => forward.await,
                }
            } => result,
            _ = cancellation.cancelled() => Err(KernelError::Cancelled),
        }
    }
}
