//! `weave run`: submit a file and render its events.

use std::path::Path;

use anyhow::{Context, Result, bail};
use tokio::io::AsyncReadExt;
use weave_commands::{Event, EventEnvelope, KernelCommand, KernelCommandResult};

use crate::opts::WeaveOpts;
use crate::session::{accept_terminal_input, build_host};

pub async fn cmd_run(opts: &WeaveOpts, file: &Path, diagnose: bool) -> Result<()> {
    let code = read_source(file).await?;
    let host = build_host(opts).await?;
    accept_terminal_input(host.root());

    let command = if diagnose {
        KernelCommand::diagnose_code(code)
    } else {
        KernelCommand::submit_code(code)
    };
    let result = host.root().send(command).await;
    render(&result, opts.json)?;

    if let Some(failed) = result.failure() {
        if failed.cancelled {
            bail!("cancelled: {}", failed.message);
        }
        bail!("{}", failed.message);
    }
    Ok(())
}

async fn read_source(file: &Path) -> Result<String> {
    if file == Path::new("-") {
        let mut code = String::new();
        tokio::io::stdin()
            .read_to_string(&mut code)
            .await
            .context("reading code from stdin")?;
        return Ok(code);
    }
    tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("reading {}", file.display()))
}

fn render(result: &KernelCommandResult, json: bool) -> Result<()> {
    for event in result.events() {
        if json {
            let envelope = EventEnvelope::new(
                event.command().as_ref().clone(),
                event.routing().to_vec(),
                event.event().clone(),
            );
            println!("{}", serde_json::to_string(&envelope)?);
            continue;
        }
        match event.event() {
            Event::StandardOutputProduced(output) => println!("{}", output.text),
            Event::ReturnValueProduced(value) => println!("{}", value.formatted.value),
            _ => {}
        }
    }
    Ok(())
}
