//! Command and event model shared by kernels, routers and transports.

pub mod envelope;
pub mod value;

mod command;
mod event;
mod info;
mod kinds;

pub use command::{
    Command, CommandId, InputType, KernelCommand, RequestInput, RequestValue, RequestValueInfos,
    SchedulingScope, SendEditableCode, SendValue, SubmissionType, SubmitCode,
};
pub use envelope::{CommandEnvelope, EventEnvelope, PROTOCOL_VERSION};
pub use event::{
    CommandFailed, Event, InputProduced, KernelCommandResult, KernelEvent, ReturnValueProduced,
    StandardOutputProduced, ValueInfo, ValueInfosProduced, ValueProduced,
};
pub use info::KernelInfo;
pub use kinds::{CommandKind, UnknownCommandKind};
pub use value::{FormatError, FormattedValue, Value, format_value};
