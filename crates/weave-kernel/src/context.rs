use std::sync::{Arc, Weak};

use log::warn;
use tokio_util::sync::CancellationToken;
use weave_commands::{
    CommandKind, Event, KernelCommand, KernelCommandResult, KernelEvent, KernelInfo,
};

use crate::composite::RouterShared;
use crate::error::KernelError;
use crate::relay::EventRelay;

/// Handed to [`crate::Kernel::handle`] for one command: the command, a way to
/// publish events, cancellation, and a client for issuing commands to other
/// kernels in the same composite.
pub struct KernelInvocationContext {
    command: Arc<KernelCommand>,
    info: KernelInfo,
    relay: Arc<EventRelay>,
    client: KernelClient,
    cancellation: CancellationToken,
    events: Vec<KernelEvent>,
}

impl KernelInvocationContext {
    pub(crate) fn new(
        command: Arc<KernelCommand>,
        info: KernelInfo,
        relay: Arc<EventRelay>,
        client: KernelClient,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            command,
            info,
            relay,
            client,
            cancellation,
            events: Vec::new(),
        }
    }

    pub fn command(&self) -> &Arc<KernelCommand> {
        &self.command
    }

    pub fn kernel_name(&self) -> &str {
        &self.info.name
    }

    pub fn kernel_info(&self) -> &KernelInfo {
        &self.info
    }

    pub fn client(&self) -> &KernelClient {
        &self.client
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Publish a non-terminal event for the current command.
    pub fn publish(&mut self, event: Event) {
        let command = self.command.clone();
        self.publish_for(command, event);
    }

    /// Publish an event on behalf of `command`, which may be a command this
    /// kernel forwarded elsewhere. Terminal events for the current command are
    /// reserved for the scheduler and are dropped.
    pub fn publish_for(&mut self, command: Arc<KernelCommand>, event: Event) {
        if event.is_terminal() && command.id() == self.command.id() {
            warn!(
                "kernel '{}' tried to publish {} for its own command; ignored",
                self.info.name,
                event.name()
            );
            return;
        }
        let event = KernelEvent::new(command, self.relay.name(), event);
        self.relay.publish(event.clone());
        self.events.push(event);
    }

    pub(crate) fn complete(mut self, outcome: Result<(), KernelError>) -> KernelCommandResult {
        let terminal = match outcome {
            Ok(()) if self.cancellation.is_cancelled() => {
                Event::cancelled(KernelError::Cancelled.to_string())
            }
            Ok(()) => Event::CommandSucceeded,
            Err(KernelError::Cancelled) => Event::cancelled(KernelError::Cancelled.to_string()),
            Err(err) => Event::failed(err.to_string()),
        };
        let terminal = KernelEvent::new(self.command.clone(), self.relay.name(), terminal);
        self.relay.publish(terminal.clone());
        self.events.push(terminal);
        KernelCommandResult::new(self.command, self.events)
    }
}

/// Route commands from inside a kernel back through the composite that owns
/// it. Targets the owning composite cannot resolve are handed to its parent.
#[derive(Clone, Default)]
pub struct KernelClient {
    router: Option<Weak<RouterShared>>,
}

impl KernelClient {
    pub(crate) fn attached(router: Weak<RouterShared>) -> Self {
        Self {
            router: Some(router),
        }
    }

    /// A client with nowhere to send commands.
    pub fn detached() -> Self {
        Self::default()
    }

    pub fn is_attached(&self) -> bool {
        self.router().is_some()
    }

    pub async fn send(&self, command: KernelCommand) -> Result<KernelCommandResult, KernelError> {
        self.send_with_cancellation(command, CancellationToken::new())
            .await
    }

    pub async fn send_with_cancellation(
        &self,
        command: KernelCommand,
        cancellation: CancellationToken,
    ) -> Result<KernelCommandResult, KernelError> {
        let router = self.router().ok_or(KernelError::Detached)?;
        Ok(router.route(command, cancellation, true).await)
    }

    /// Describe a kernel reachable from here.
    pub fn kernel_info(&self, name: &str) -> Option<KernelInfo> {
        self.router()?.find_info(name)
    }

    /// Default target for `kind`, looked up from the owning composite upwards.
    pub fn default_target_for(&self, kind: CommandKind) -> Option<String> {
        self.router()?.inherited_default_target(kind)
    }

    fn router(&self) -> Option<Arc<RouterShared>> {
        self.router.as_ref()?.upgrade()
    }
}
