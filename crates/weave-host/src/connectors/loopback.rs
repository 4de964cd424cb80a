use async_trait::async_trait;
use futures::StreamExt;
use futures::stream;
use weave_commands::{CommandEnvelope, EventEnvelope, KernelEvent, KernelInfo, PROTOCOL_VERSION};
use weave_kernel::CompositeKernel;

use super::traits::{ConnectorError, EventStream, KernelConnector};

/// In-process connector to another composite. Commands and events go
/// through their JSON encoding so the wire shapes are exercised without a
/// transport.
pub struct LoopbackConnector {
    uri: String,
    remote: CompositeKernel,
}

impl LoopbackConnector {
    pub fn new(uri: impl Into<String>, remote: CompositeKernel) -> Self {
        Self {
            uri: uri.into(),
            remote,
        }
    }
}

#[async_trait]
impl KernelConnector for LoopbackConnector {
    fn uri(&self) -> &str {
        &self.uri
    }

    async fn kernel_info(&self) -> Result<KernelInfo, ConnectorError> {
        Ok(reencode(&self.remote.info())?)
    }

    async fn send(&self, envelope: CommandEnvelope) -> Result<EventStream, ConnectorError> {
        let envelope: CommandEnvelope = reencode(&envelope)?;
        if envelope.v != PROTOCOL_VERSION {
            return Err(ConnectorError::ProtocolVersion {
                expected: PROTOCOL_VERSION,
                found: envelope.v,
            });
        }
        let result = self.remote.send(envelope.command).await;
        let events = result
            .into_events()
            .iter()
            .map(to_envelope)
            .map(|e| reencode(&e).map_err(ConnectorError::from))
            .collect::<Vec<_>>();
        Ok(stream::iter(events).boxed())
    }
}

pub(crate) fn to_envelope(event: &KernelEvent) -> EventEnvelope {
    EventEnvelope::new(
        event.command().as_ref().clone(),
        event.routing().to_vec(),
        event.event().clone(),
    )
}

fn reencode<T>(value: &T) -> Result<T, serde_json::Error>
where
    T: serde::Serialize + serde::de::DeserializeOwned,
{
    serde_json::from_value(serde_json::to_value(value)?)
}
