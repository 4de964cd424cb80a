//! Transport shapes for forwarding commands to a remote kernel and replaying
//! its events locally.

use serde::{Deserialize, Serialize};

use crate::command::KernelCommand;
use crate::event::Event;

pub const PROTOCOL_VERSION: u8 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub v: u8,
    pub command: KernelCommand,
}

impl CommandEnvelope {
    pub fn new(command: KernelCommand) -> Self {
        Self {
            v: PROTOCOL_VERSION,
            command,
        }
    }
}

/// A remote event plus the command that caused it. The command travels with
/// the event so that events for commands the remote side issued on its own can
/// still be correlated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub v: u8,
    pub command: KernelCommand,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routing: Vec<String>,
    pub event: Event,
}

impl EventEnvelope {
    pub fn new(command: KernelCommand, routing: Vec<String>, event: Event) -> Self {
        Self {
            v: PROTOCOL_VERSION,
            command,
            routing,
            event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_event_envelope_shape() {
        let cmd = KernelCommand::submit_code("throw 1").with_target("javascript");
        let env = EventEnvelope::new(cmd, vec!["javascript".into()], Event::failed("boom"));
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["v"], 1);
        assert_eq!(json["event"]["eventType"], "CommandFailed");
        assert_eq!(json["event"]["event"]["message"], "boom");
        assert_eq!(json["event"]["event"]["cancelled"], false);
        let back: EventEnvelope = serde_json::from_value(json).unwrap();
        assert_eq!(back, env);
    }
}
