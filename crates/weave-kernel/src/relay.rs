use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::broadcast;
use weave_commands::{Event, KernelCommand, KernelCommandResult, KernelEvent};

/// Events a subscriber may fall behind by before it starts missing them.
pub const RELAY_CAPACITY: usize = 1024;

/// Per-kernel event stream. Every event published here is forwarded to the
/// upstream relay (the parent composite's) with the parent's name appended to
/// the routing path, so a root subscriber sees the whole tree.
pub struct EventRelay {
    name: String,
    sender: broadcast::Sender<KernelEvent>,
    upstream: RwLock<Option<Arc<EventRelay>>>,
}

impl EventRelay {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        let (sender, _) = broadcast::channel(RELAY_CAPACITY);
        Arc::new(Self {
            name: name.into(),
            sender,
            upstream: RwLock::new(None),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Receive every event published from now on.
    ///
    /// A subscriber more than [`RELAY_CAPACITY`] events behind loses the
    /// oldest ones: its next `recv` returns `RecvError::Lagged` with the
    /// number skipped and then resumes from the oldest event still held.
    /// Command results are unaffected; they never go through subscriptions.
    pub fn subscribe(&self) -> broadcast::Receiver<KernelEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: KernelEvent) {
        // No subscribers is not an error.
        let _ = self.sender.send(event.clone());
        let upstream = self
            .upstream
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(upstream) = upstream {
            let republished = event.republished_by(upstream.name());
            upstream.publish(republished);
        }
    }

    /// Returns false if the relay already had an upstream.
    pub(crate) fn attach(&self, upstream: Arc<EventRelay>) -> bool {
        let mut slot = self.upstream.write().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return false;
        }
        *slot = Some(upstream);
        true
    }

    /// Publish a terminal event for a command that never reached a scheduler
    /// (routing failures, selector-split parents) and package the result.
    pub(crate) fn complete_unscheduled(
        &self,
        command: Arc<KernelCommand>,
        mut events: Vec<KernelEvent>,
        terminal: Event,
    ) -> KernelCommandResult {
        let terminal = KernelEvent::new(command.clone(), self.name.clone(), terminal);
        self.publish(terminal.clone());
        events.push(terminal);
        KernelCommandResult::new(command, events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_flow_upstream_with_routing() {
        let root = EventRelay::new("root");
        let leaf = EventRelay::new("csharp");
        assert!(leaf.attach(root.clone()));
        assert!(!leaf.attach(EventRelay::new("other")));

        let mut rx = root.subscribe();
        let cmd = Arc::new(KernelCommand::submit_code("1"));
        leaf.publish(KernelEvent::new(cmd, "csharp", Event::CommandSucceeded));

        let seen = rx.recv().await.unwrap();
        assert_eq!(seen.routing(), ["csharp", "root"]);
    }

    #[tokio::test]
    async fn slow_subscriber_skips_the_oldest_events() {
        let relay = EventRelay::new("csharp");
        let mut rx = relay.subscribe();
        let commands: Vec<_> = (0..=RELAY_CAPACITY)
            .map(|i| Arc::new(KernelCommand::submit_code(i.to_string())))
            .collect();
        for command in &commands {
            relay.publish(KernelEvent::new(command.clone(), "csharp", Event::CommandSucceeded));
        }

        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(1))
        ));
        let next = rx.recv().await.unwrap();
        assert_eq!(next.command().id(), commands[1].id());
    }
}
