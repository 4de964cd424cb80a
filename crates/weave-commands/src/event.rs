use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::command::KernelCommand;
use crate::value::{FormattedValue, Value};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandFailed {
    pub message: String,
    #[serde(default)]
    pub cancelled: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueProduced {
    pub name: String,
    /// Native value; absent when the value was requested in a specific mime type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    pub formatted: FormattedValue,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueInfo {
    pub name: String,
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValueInfosProduced {
    pub infos: Vec<ValueInfo>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InputProduced {
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReturnValueProduced {
    pub value: Value,
    pub formatted: FormattedValue,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StandardOutputProduced {
    pub text: String,
}

/// Observations published while a command is processed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "eventType", content = "event")]
pub enum Event {
    CommandSucceeded,
    CommandFailed(CommandFailed),
    ValueProduced(ValueProduced),
    ValueInfosProduced(ValueInfosProduced),
    InputProduced(InputProduced),
    ReturnValueProduced(ReturnValueProduced),
    StandardOutputProduced(StandardOutputProduced),
}

impl Event {
    pub fn failed(message: impl Into<String>) -> Self {
        Event::CommandFailed(CommandFailed {
            message: message.into(),
            cancelled: false,
        })
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Event::CommandFailed(CommandFailed {
            message: message.into(),
            cancelled: true,
        })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Event::CommandSucceeded | Event::CommandFailed(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Event::CommandSucceeded => "CommandSucceeded",
            Event::CommandFailed(_) => "CommandFailed",
            Event::ValueProduced(_) => "ValueProduced",
            Event::ValueInfosProduced(_) => "ValueInfosProduced",
            Event::InputProduced(_) => "InputProduced",
            Event::ReturnValueProduced(_) => "ReturnValueProduced",
            Event::StandardOutputProduced(_) => "StandardOutputProduced",
        }
    }
}

/// An event tagged with the command that caused it and the kernels it passed
/// through. `routing[0]` is the emitting kernel; each composite that
/// republishes the event appends its own name.
#[derive(Clone, Debug)]
pub struct KernelEvent {
    command: Arc<KernelCommand>,
    routing: Vec<String>,
    event: Event,
}

impl KernelEvent {
    pub fn new(command: Arc<KernelCommand>, origin: impl Into<String>, event: Event) -> Self {
        Self {
            command,
            routing: vec![origin.into()],
            event,
        }
    }

    /// Rebuild an event whose routing path was recorded elsewhere (e.g. by a
    /// remote peer).
    pub fn with_routing(command: Arc<KernelCommand>, routing: Vec<String>, event: Event) -> Self {
        Self {
            command,
            routing,
            event,
        }
    }

    pub fn command(&self) -> &Arc<KernelCommand> {
        &self.command
    }

    pub fn event(&self) -> &Event {
        &self.event
    }

    pub fn into_event(self) -> Event {
        self.event
    }

    pub fn origin(&self) -> Option<&str> {
        self.routing.first().map(String::as_str)
    }

    pub fn routing(&self) -> &[String] {
        &self.routing
    }

    pub fn is_terminal(&self) -> bool {
        self.event.is_terminal()
    }

    /// Copy of this event as seen one level up the kernel tree.
    pub fn republished_by(&self, kernel_name: &str) -> Self {
        let mut routing = self.routing.clone();
        routing.push(kernel_name.to_string());
        Self {
            command: self.command.clone(),
            routing,
            event: self.event.clone(),
        }
    }
}

/// Everything published for one command, ending with its terminal event.
#[derive(Clone, Debug)]
pub struct KernelCommandResult {
    command: Arc<KernelCommand>,
    events: Vec<KernelEvent>,
}

impl KernelCommandResult {
    pub fn new(command: Arc<KernelCommand>, events: Vec<KernelEvent>) -> Self {
        Self { command, events }
    }

    pub fn command(&self) -> &Arc<KernelCommand> {
        &self.command
    }

    pub fn events(&self) -> &[KernelEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<KernelEvent> {
        self.events
    }

    /// The terminal event of the command itself.
    pub fn terminal(&self) -> Option<&Event> {
        self.own_events()
            .map(KernelEvent::event)
            .find(|event| event.is_terminal())
    }

    pub fn succeeded(&self) -> bool {
        matches!(self.terminal(), Some(Event::CommandSucceeded))
    }

    pub fn failure(&self) -> Option<&CommandFailed> {
        match self.terminal() {
            Some(Event::CommandFailed(failed)) => Some(failed),
            _ => None,
        }
    }

    pub fn failure_message(&self) -> Option<&str> {
        self.failure().map(|failed| failed.message.as_str())
    }

    pub fn value_produced(&self) -> Option<&ValueProduced> {
        self.events.iter().find_map(|e| match e.event() {
            Event::ValueProduced(v) => Some(v),
            _ => None,
        })
    }

    pub fn input_produced(&self) -> Option<&str> {
        self.events.iter().find_map(|e| match e.event() {
            Event::InputProduced(input) => Some(input.value.as_str()),
            _ => None,
        })
    }

    pub fn return_value(&self) -> Option<&ReturnValueProduced> {
        self.events.iter().find_map(|e| match e.event() {
            Event::ReturnValueProduced(v) => Some(v),
            _ => None,
        })
    }

    pub fn value_infos(&self) -> Option<&[ValueInfo]> {
        self.events.iter().find_map(|e| match e.event() {
            Event::ValueInfosProduced(v) => Some(v.infos.as_slice()),
            _ => None,
        })
    }

    /// Number of `CommandFailed` events across the whole result.
    pub fn failure_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e.event(), Event::CommandFailed(_)))
            .count()
    }

    fn own_events(&self) -> impl Iterator<Item = &KernelEvent> {
        let id = self.command.id();
        self.events.iter().filter(move |e| e.command().id() == id)
    }
}
