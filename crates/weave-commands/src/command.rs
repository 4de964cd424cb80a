use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::CommandKind;
use crate::value::{FormattedValue, Value};

const DISPLAY_CODE_LIMIT: usize = 40;

/// Correlation identity generated when a command is constructed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandId(Uuid);

impl CommandId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CommandId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Identity of a FIFO queue within one kernel. Commands without a scope share
/// the kernel's default queue.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchedulingScope(String);

impl SchedulingScope {
    pub fn new(scope: impl Into<String>) -> Self {
        Self(scope.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SchedulingScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SubmissionType {
    /// Execute the code.
    #[default]
    Run,
    /// Only check the code; no side effects.
    Diagnose,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InputType {
    #[default]
    Text,
    Password,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitCode {
    pub code: String,
    #[serde(default)]
    pub submission_type: SubmissionType,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestInput {
    pub prompt: String,
    #[serde(default)]
    pub input_type: InputType,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestValue {
    pub name: String,
    /// When set, the value is returned only as a string in this mime type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestValueInfos {}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendValue {
    pub name: String,
    pub formatted: FormattedValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendEditableCode {
    pub kernel_name: String,
    pub code: String,
}

/// Command payloads, one per [`CommandKind`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "commandType", content = "command")]
pub enum Command {
    SubmitCode(SubmitCode),
    RequestInput(RequestInput),
    RequestValue(RequestValue),
    RequestValueInfos(RequestValueInfos),
    SendValue(SendValue),
    SendEditableCode(SendEditableCode),
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::SubmitCode(_) => CommandKind::SubmitCode,
            Command::RequestInput(_) => CommandKind::RequestInput,
            Command::RequestValue(_) => CommandKind::RequestValue,
            Command::RequestValueInfos(_) => CommandKind::RequestValueInfos,
            Command::SendValue(_) => CommandKind::SendValue,
            Command::SendEditableCode(_) => CommandKind::SendEditableCode,
        }
    }
}

/// A command plus its routing envelope.
///
/// The payload never changes after construction. The target can be filled in
/// once while it is unset; an explicit target is never overridden. Schedulers
/// take commands behind an `Arc`, which freezes the target for the rest of the
/// command's lifecycle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KernelCommand {
    id: CommandId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    target_kernel_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    scheduling_scope: Option<SchedulingScope>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parent: Option<CommandId>,
    command: Command,
}

impl KernelCommand {
    pub fn new(command: Command) -> Self {
        Self {
            id: CommandId::new(),
            target_kernel_name: None,
            scheduling_scope: None,
            parent: None,
            command,
        }
    }

    pub fn submit_code(code: impl Into<String>) -> Self {
        Self::new(Command::SubmitCode(SubmitCode {
            code: code.into(),
            submission_type: SubmissionType::Run,
        }))
    }

    pub fn diagnose_code(code: impl Into<String>) -> Self {
        Self::new(Command::SubmitCode(SubmitCode {
            code: code.into(),
            submission_type: SubmissionType::Diagnose,
        }))
    }

    pub fn request_input(prompt: impl Into<String>, input_type: InputType) -> Self {
        Self::new(Command::RequestInput(RequestInput {
            prompt: prompt.into(),
            input_type,
        }))
    }

    pub fn request_value(name: impl Into<String>, mime_type: Option<String>) -> Self {
        Self::new(Command::RequestValue(RequestValue {
            name: name.into(),
            mime_type,
        }))
    }

    pub fn request_value_infos() -> Self {
        Self::new(Command::RequestValueInfos(RequestValueInfos {}))
    }

    pub fn send_value(name: impl Into<String>, formatted: FormattedValue, value: Option<Value>) -> Self {
        Self::new(Command::SendValue(SendValue {
            name: name.into(),
            formatted,
            value,
        }))
    }

    pub fn send_editable_code(kernel_name: impl Into<String>, code: impl Into<String>) -> Self {
        Self::new(Command::SendEditableCode(SendEditableCode {
            kernel_name: kernel_name.into(),
            code: code.into(),
        }))
    }

    /// Set an explicit target at construction time.
    pub fn with_target(mut self, kernel_name: impl Into<String>) -> Self {
        self.target_kernel_name = Some(kernel_name.into());
        self
    }

    pub fn with_scope(mut self, scope: Option<SchedulingScope>) -> Self {
        self.scheduling_scope = scope;
        self
    }

    /// Record the command that issued this one.
    pub fn with_parent(mut self, parent: CommandId) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Fill in the target if none was given. Returns whether the target changed.
    pub fn set_target_if_unset(&mut self, kernel_name: &str) -> bool {
        if self.target_kernel_name.is_some() {
            return false;
        }
        self.target_kernel_name = Some(kernel_name.to_string());
        true
    }

    /// Copy addressed to a kernel in another process. Identity, scope, and
    /// parent are kept so remote events correlate with this command.
    pub fn for_remote(&self, target_kernel_name: Option<String>) -> Self {
        Self {
            target_kernel_name,
            ..self.clone()
        }
    }

    pub fn id(&self) -> CommandId {
        self.id
    }

    pub fn kind(&self) -> CommandKind {
        self.command.kind()
    }

    pub fn command(&self) -> &Command {
        &self.command
    }

    pub fn target_kernel_name(&self) -> Option<&str> {
        self.target_kernel_name.as_deref()
    }

    pub fn scheduling_scope(&self) -> Option<&SchedulingScope> {
        self.scheduling_scope.as_ref()
    }

    pub fn parent(&self) -> Option<CommandId> {
        self.parent
    }
}

impl fmt::Display for KernelCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.command {
            Command::SubmitCode(submit) => {
                write!(f, "SubmitCode: {}", truncate_for_display(&submit.code))
            }
            Command::RequestInput(req) => write!(f, "RequestInput: {}", req.prompt),
            Command::RequestValue(req) => write!(f, "RequestValue: {}", req.name),
            Command::SendValue(send) => write!(f, "SendValue: {}", send.name),
            Command::SendEditableCode(send) => write!(f, "SendEditableCode: {}", send.kernel_name),
            Command::RequestValueInfos(_) => f.write_str("RequestValueInfos"),
        }
    }
}

fn truncate_for_display(code: &str) -> String {
    let first_line = code.trim().lines().next().unwrap_or_default();
    let mut out: String = first_line.chars().take(DISPLAY_CODE_LIMIT).collect();
    if out.len() < code.trim().len() {
        out.push_str(" ...");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_is_only_augmented() {
        let mut cmd = KernelCommand::submit_code("1+3");
        assert!(cmd.set_target_if_unset("csharp"));
        assert!(!cmd.set_target_if_unset("fsharp"));
        assert_eq!(cmd.target_kernel_name(), Some("csharp"));

        let mut explicit = KernelCommand::submit_code("1+3").with_target("fsharp");
        assert!(!explicit.set_target_if_unset("csharp"));
        assert_eq!(explicit.target_kernel_name(), Some("fsharp"));
    }

    #[test]
    fn remote_copy_keeps_identity() {
        let cmd = KernelCommand::submit_code("1").with_target("javascript");
        let remote = cmd.for_remote(None);
        assert_eq!(remote.id(), cmd.id());
        assert_eq!(remote.target_kernel_name(), None);
    }

    #[test]
    fn ids_are_unique() {
        let a = KernelCommand::request_value_infos();
        let b = KernelCommand::request_value_infos();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn display_truncates_long_code() {
        let cmd = KernelCommand::submit_code("let x = 1\nlet y = 2");
        assert_eq!(cmd.to_string(), "SubmitCode: let x = 1 ...");
        let short = KernelCommand::submit_code("1+3");
        assert_eq!(short.to_string(), "SubmitCode: 1+3");
    }

    #[test]
    fn wire_shape_uses_command_type_tag() {
        let cmd = KernelCommand::request_value("y", None).with_target("fsharp");
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["targetKernelName"], "fsharp");
        assert_eq!(json["command"]["commandType"], "RequestValue");
        assert_eq!(json["command"]["command"]["name"], "y");
        let back: KernelCommand = serde_json::from_value(json).unwrap();
        assert_eq!(back, cmd);
    }
}
