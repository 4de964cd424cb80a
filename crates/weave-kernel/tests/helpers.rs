//! Shared kernels for integration tests.
//!
//! Each integration test compiles this module separately, so some helpers
//! may appear unused in a given test binary.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use weave_commands::{Command, CommandKind, KernelInfo};
use weave_kernel::{
    CompositeKernel, Kernel, KernelError, KernelHandle, KernelInvocationContext, LanguageKernel,
    ScriptEngine,
};

pub fn script_kernel(name: &str) -> LanguageKernel<ScriptEngine> {
    LanguageKernel::new(name, ScriptEngine::new().with_language(name))
}

/// A `.NET`-style composite with two kernels sharing one runtime.
pub fn dotnet() -> (CompositeKernel, KernelHandle, KernelHandle) {
    let composite = CompositeKernel::new(".NET");
    let csharp = composite.add(script_kernel("csharp")).unwrap();
    let fsharp = composite.add(script_kernel("fsharp")).unwrap();
    (composite, csharp, fsharp)
}

pub type Log = Arc<Mutex<Vec<String>>>;

pub fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

/// Records `start:<code>` and `end:<code>` around each submission. Code
/// `block` runs until its command is cancelled; anything else sleeps for the
/// configured delay.
pub struct RecordingKernel {
    info: KernelInfo,
    log: Log,
    delay: Duration,
}

impl RecordingKernel {
    pub fn new(name: &str, log: Log, delay: Duration) -> Self {
        Self {
            info: KernelInfo::new(name).with_commands([CommandKind::SubmitCode]),
            log,
            delay,
        }
    }
}

#[async_trait]
impl Kernel for RecordingKernel {
    fn info(&self) -> &KernelInfo {
        &self.info
    }

    async fn handle(&mut self, ctx: &mut KernelInvocationContext) -> Result<(), KernelError> {
        let Command::SubmitCode(submit) = ctx.command().command() else {
            return Ok(());
        };
        let code = submit.code.clone();
        let name = &self.info.name;
        self.log.lock().unwrap().push(format!("{name}:start:{code}"));
        if code == "block" {
            ctx.cancellation().cancelled().await;
        } else {
            tokio::time::sleep(self.delay).await;
        }
        self.log.lock().unwrap().push(format!("{name}:end:{code}"));
        Ok(())
    }
}
