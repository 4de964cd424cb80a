use async_trait::async_trait;
use weave_commands::KernelInfo;

use crate::context::KernelInvocationContext;
use crate::error::KernelError;

/// A unit that handles commands.
///
/// Implementations publish intermediate events through the context and return
/// `Ok(())` or an error; the scheduler turns the result into the single
/// terminal event. A kernel never sees more than one command at a time.
#[async_trait]
pub trait Kernel: Send {
    fn info(&self) -> &KernelInfo;

    async fn handle(&mut self, ctx: &mut KernelInvocationContext) -> Result<(), KernelError>;
}
