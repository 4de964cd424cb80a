//! Kernels, per-kernel scheduling, composite routing, and the `#!set`
//! directive.

pub mod composite;
pub mod context;
pub mod directive;
pub mod error;
pub mod handler;
pub mod kernel;
pub mod language;
pub mod relay;
pub mod scheduler;
pub mod script;
pub mod set_directive;
pub mod value_store;

pub use composite::CompositeKernel;
pub use context::{KernelClient, KernelInvocationContext};
pub use directive::DirectiveError;
pub use error::KernelError;
pub use handler::{CommandHandler, FnHandler, handler_fn};
pub use kernel::Kernel;
pub use language::{ExecutionEngine, ExecutionError, LanguageKernel, RunOutcome};
pub use relay::{EventRelay, RELAY_CAPACITY};
pub use scheduler::{KernelHandle, SchedulerState};
pub use script::ScriptEngine;
pub use set_directive::{SetOptions, ValueSource};
pub use value_store::{StoredValue, ValueStore};
