use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use weave_commands::{CommandKind, Event, KernelCommand, KernelInfo};

use crate::context::KernelInvocationContext;
use crate::error::KernelError;
use crate::kernel::Kernel;

/// Command handler registered directly on a composite kernel.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, ctx: &mut KernelInvocationContext) -> Result<(), KernelError>;
}

pub(crate) type HandlerTable = Arc<RwLock<HashMap<CommandKind, Arc<dyn CommandHandler>>>>;

/// Adapter for synchronous handlers that map a command to the events it
/// produces.
pub struct FnHandler<F>(F);

pub fn handler_fn<F>(f: F) -> FnHandler<F>
where
    F: Fn(&KernelCommand) -> Result<Vec<Event>, KernelError> + Send + Sync,
{
    FnHandler(f)
}

#[async_trait]
impl<F> CommandHandler for FnHandler<F>
where
    F: Fn(&KernelCommand) -> Result<Vec<Event>, KernelError> + Send + Sync,
{
    async fn handle(&self, ctx: &mut KernelInvocationContext) -> Result<(), KernelError> {
        let command = ctx.command().clone();
        for event in (self.0)(&command)? {
            ctx.publish(event);
        }
        Ok(())
    }
}

/// Runs a composite's own handlers. It is scheduled under the composite's
/// name and publishes on the composite's relay.
pub(crate) struct HandlerKernel {
    info: KernelInfo,
    handlers: HandlerTable,
}

impl HandlerKernel {
    pub(crate) fn new(name: &str, handlers: HandlerTable) -> Self {
        Self {
            info: KernelInfo::new(name),
            handlers,
        }
    }
}

#[async_trait]
impl Kernel for HandlerKernel {
    fn info(&self) -> &KernelInfo {
        &self.info
    }

    async fn handle(&mut self, ctx: &mut KernelInvocationContext) -> Result<(), KernelError> {
        let kind = ctx.command().kind();
        let handler = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .cloned();
        match handler {
            Some(handler) => handler.handle(ctx).await,
            None => Err(KernelError::UnsupportedCommand {
                kernel: self.info.name.clone(),
                kind,
            }),
        }
    }
}
