//! Builds the kernel tree every command works against.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;
use tracing::debug;
use weave_commands::{Command, CommandKind, Event, InputProduced, InputType};
use weave_host::{HostConfig, KernelHost, NdjsonConnector};
use weave_kernel::{
    CommandHandler, CompositeKernel, KernelError, KernelInvocationContext, LanguageKernel,
    ScriptEngine,
};

use crate::opts::WeaveOpts;

pub const ROOT_KERNEL: &str = "weave";

/// Host with the local and remote kernels named in `opts`.
pub async fn build_host(opts: &WeaveOpts) -> Result<KernelHost> {
    let mut config = HostConfig::from_env();
    if let Some(ms) = opts.timeout_ms {
        config.request_timeout = (ms > 0).then(|| Duration::from_millis(ms));
    }

    let specs = opts.kernel_specs();
    config.default_kernel = opts
        .default_kernel
        .clone()
        .or_else(|| specs.first().map(|spec| spec.name.clone()));

    let mut host = KernelHost::new(CompositeKernel::new(ROOT_KERNEL), config);
    for spec in &specs {
        let mut engine = ScriptEngine::new().with_language(spec.name.clone());
        if let Some(runtime) = &spec.runtime {
            engine = engine.with_runtime(runtime.clone());
        }
        host.add_kernel(LanguageKernel::new(spec.name.clone(), engine))
            .with_context(|| format!("adding kernel '{}'", spec.name))?;
    }

    for remote in &opts.remotes {
        let uri = format!("process://{}", remote.name);
        let mut command = tokio::process::Command::new(&remote.program);
        command.args(&remote.args);
        let connector = NdjsonConnector::spawn(uri.clone(), command)
            .with_context(|| format!("starting remote kernel '{}'", remote.name))?;
        host.register_connector(std::sync::Arc::new(connector), [remote.name.clone()]);
        host.connect_proxy_kernel(&remote.name, &uri, None)
            .await
            .with_context(|| format!("connecting remote kernel '{}'", remote.name))?;
    }

    host.apply_defaults();
    Ok(host)
}

/// Answer input prompts from this process's stdin.
pub fn accept_terminal_input(root: &CompositeKernel) {
    root.register_command_handler(CommandKind::RequestInput, TerminalInput::default());
    root.set_default_target_kernel_name_for_command(CommandKind::RequestInput, root.name());
}

struct TerminalInput {
    lines: Mutex<Lines<BufReader<Stdin>>>,
}

impl Default for TerminalInput {
    fn default() -> Self {
        Self {
            lines: Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
        }
    }
}

#[async_trait]
impl CommandHandler for TerminalInput {
    async fn handle(&self, ctx: &mut KernelInvocationContext) -> Result<(), KernelError> {
        let command = ctx.command().clone();
        let Command::RequestInput(request) = command.command() else {
            return Err(KernelError::UnsupportedCommand {
                kernel: ctx.kernel_name().to_string(),
                kind: command.kind(),
            });
        };
        let prompt = match request.input_type {
            InputType::Text => format!("{}: ", request.prompt),
            InputType::Password => format!("{} (hidden): ", request.prompt),
        };
        let mut stderr = tokio::io::stderr();
        stderr
            .write_all(prompt.as_bytes())
            .await
            .map_err(|err| KernelError::Transport(err.to_string()))?;
        stderr
            .flush()
            .await
            .map_err(|err| KernelError::Transport(err.to_string()))?;

        let mut lines = self.lines.lock().await;
        let line = tokio::select! {
            line = lines.next_line() => line.map_err(|err| KernelError::Transport(err.to_string()))?,
            _ = ctx.cancellation().cancelled() => return Err(KernelError::Cancelled),
        };
        let Some(value) = line else {
            return Err(KernelError::InputNotProduced);
        };
        debug!(prompt = %request.prompt, "read input from terminal");
        ctx.publish(Event::InputProduced(InputProduced { value }));
        Ok(())
    }
}
