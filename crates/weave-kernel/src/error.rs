use thiserror::Error;
use weave_commands::{CommandKind, FormatError};

use crate::directive::DirectiveError;
use crate::language::ExecutionError;

/// Failures raised while routing or handling a command. The scheduler turns
/// every error into the command's terminal `CommandFailed` event, using the
/// `Display` text as the message.
#[derive(Debug, Error)]
pub enum KernelError {
    #[error("Kernel '{0}' not found.")]
    KernelNotFound(String),
    #[error("No target kernel could be determined for command '{0}'.")]
    NoTargetKernel(CommandKind),
    #[error("Kernel '{kernel}' does not support command type '{kind}'.")]
    UnsupportedCommand { kernel: String, kind: CommandKind },
    #[error("A kernel named '{0}' is already registered.")]
    DuplicateKernel(String),
    #[error("Kernel '{0}' is already attached to a composite kernel.")]
    AlreadyAttached(String),
    #[error("Kernel '{0}' is busy with the command that issued this request.")]
    Reentrant(String),
    #[error("Kernel '{kernel}' is waiting on kernel '{issuer}'; the request would deadlock.")]
    WaitCycle { kernel: String, issuer: String },
    #[error("No composite kernel is available to route the request.")]
    Detached,
    #[error(transparent)]
    Directive(#[from] DirectiveError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error("The submission did not produce a return value.")]
    NoReturnValue,
    #[error("Value '{name}' not found in kernel '{kernel}'.")]
    ValueNotFound { kernel: String, name: String },
    #[error("The input request completed without producing a value.")]
    InputNotProduced,
    #[error(transparent)]
    Format(#[from] FormatError),
    /// Failure reported by another kernel, passed through verbatim.
    #[error("{0}")]
    Remote(String),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Command cancelled.")]
    Cancelled,
    #[error("Scheduler for kernel '{0}' stopped before the command completed.")]
    SchedulerStopped(String),
}
