//! Shared kernels for host integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream;
use weave_commands::{CommandEnvelope, CommandKind, KernelInfo};
use weave_host::connectors::{ConnectorError, EventStream};
use weave_host::{KernelConnector, LoopbackConnector};
use weave_kernel::{CompositeKernel, LanguageKernel, ScriptEngine};

pub const WEBVIEW_URI: &str = "kernel://webview/javascript";

pub fn script_kernel(name: &str, runtime: &str) -> LanguageKernel<ScriptEngine> {
    LanguageKernel::new(name, ScriptEngine::new().with_language(name).with_runtime(runtime))
}

/// A remote side hosting one script kernel in a different runtime.
pub fn webview() -> CompositeKernel {
    let remote = CompositeKernel::new("webview");
    remote.add(script_kernel("javascript", "browser")).unwrap();
    remote
}

pub fn loopback(uri: &str, remote: CompositeKernel) -> Arc<dyn KernelConnector> {
    Arc::new(LoopbackConnector::new(uri, remote))
}

/// Accepts commands and never answers them.
pub struct SilentConnector;

#[async_trait]
impl KernelConnector for SilentConnector {
    fn uri(&self) -> &str {
        "kernel://silent"
    }

    async fn kernel_info(&self) -> Result<KernelInfo, ConnectorError> {
        Ok(KernelInfo::new("silent").with_commands([CommandKind::SubmitCode]))
    }

    async fn send(&self, _command: CommandEnvelope) -> Result<EventStream, ConnectorError> {
        Ok(stream::pending().boxed())
    }
}
