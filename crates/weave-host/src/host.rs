use std::sync::Arc;

use tracing::info;
use weave_commands::CommandKind;
use weave_kernel::{CompositeKernel, Kernel, KernelHandle};

use crate::config::{FrontendKernelConfig, HostConfig};
use crate::connectors::{ConnectorRegistry, KernelConnector};
use crate::error::HostError;
use crate::proxy::ProxyKernel;

pub const FRONTEND_TAG: &str = "frontend";
pub const JAVASCRIPT_TAG: &str = "js";

/// Commands the hosting frontend answers for every kernel.
const FRONTEND_COMMANDS: [CommandKind; 2] =
    [CommandKind::RequestInput, CommandKind::SendEditableCode];

const JAVASCRIPT_COMMANDS: [CommandKind; 4] = [
    CommandKind::SubmitCode,
    CommandKind::RequestValue,
    CommandKind::RequestValueInfos,
    CommandKind::SendValue,
];

/// Proxies created by [`KernelHost::connect_frontend`].
pub struct FrontendKernels {
    pub vscode: KernelHandle,
    pub javascript: KernelHandle,
}

/// Owns the root composite and the connectors used to reach remote kernels.
pub struct KernelHost {
    root: CompositeKernel,
    connectors: ConnectorRegistry,
    config: HostConfig,
}

impl KernelHost {
    pub fn new(root: CompositeKernel, config: HostConfig) -> Self {
        Self {
            root,
            connectors: ConnectorRegistry::new(),
            config,
        }
    }

    pub fn root(&self) -> &CompositeKernel {
        &self.root
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn connectors(&self) -> &ConnectorRegistry {
        &self.connectors
    }

    pub fn register_connector<I, S>(&mut self, connector: Arc<dyn KernelConnector>, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.connectors.register(connector, tags);
    }

    pub fn add_kernel(&self, kernel: impl Kernel + 'static) -> Result<KernelHandle, HostError> {
        Ok(self.root.add(kernel)?)
    }

    /// Route untargeted submissions to the configured default kernel.
    pub fn apply_defaults(&self) {
        if let Some(name) = &self.config.default_kernel {
            self.root
                .set_default_target_kernel_name_for_command(CommandKind::SubmitCode, name.clone());
        }
    }

    /// Add a proxy named `name` for the kernel behind `uri`.
    pub async fn connect_proxy_kernel(
        &self,
        name: &str,
        uri: &str,
        tag: Option<&str>,
    ) -> Result<KernelHandle, HostError> {
        let connector = self
            .connectors
            .resolve(uri, tag)
            .ok_or_else(|| HostError::NoConnector(uri.to_string()))?;
        let proxy = ProxyKernel::connect(name, connector)
            .await?
            .with_timeout(self.config.request_timeout);
        let handle = self.root.add(proxy)?;
        info!(kernel = name, uri, "connected proxy kernel");
        Ok(handle)
    }

    /// Connect the frontend's own kernel and its JavaScript kernel. The
    /// frontend becomes the default target for input prompts and editable
    /// code.
    pub async fn connect_frontend(&self) -> Result<FrontendKernels, HostError> {
        let FrontendKernelConfig { name, uri } = &self.config.frontend.vscode;
        let vscode = self
            .connect_proxy_kernel(name, uri, Some(FRONTEND_TAG))
            .await?;
        for kind in FRONTEND_COMMANDS {
            vscode.add_supported_command(kind);
            self.root
                .set_default_target_kernel_name_for_command(kind, name.clone());
        }

        let FrontendKernelConfig { name, uri } = &self.config.frontend.javascript;
        let javascript = self
            .connect_proxy_kernel(name, uri, Some(JAVASCRIPT_TAG))
            .await?;
        for kind in JAVASCRIPT_COMMANDS {
            javascript.add_supported_command(kind);
        }
        Ok(FrontendKernels { vscode, javascript })
    }
}
