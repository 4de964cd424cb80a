//! `weave` command-line interface.

mod commands;
mod opts;
mod session;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use opts::WeaveOpts;

#[derive(Parser, Debug)]
#[command(name = "weave", version, about = "Run polyglot notebooks across cooperating kernels")]
struct Cli {
    #[command(flatten)]
    opts: WeaveOpts,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit a file (or stdin with `-`) to the kernel tree and print what it produces
    Run {
        /// Source file; `#!kernel` lines switch the kernel for the lines that follow
        file: PathBuf,

        /// Only check the code without running it
        #[arg(long)]
        diagnose: bool,
    },

    /// Describe the configured kernels and the commands they support
    Info,

    /// Serve the kernel tree over NDJSON on stdin/stdout
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging();

    let cli = Cli::parse();
    match cli.command {
        Command::Run { file, diagnose } => commands::run::cmd_run(&cli.opts, &file, diagnose).await,
        Command::Info => commands::info::cmd_info(&cli.opts).await,
        Command::Serve => commands::serve::cmd_serve(&cli.opts).await,
    }
}

/// Logs go to stderr so stdout stays free for program output and the
/// NDJSON transport. `WEAVE_LOG` takes precedence over `RUST_LOG`.
fn setup_logging() {
    let filter = EnvFilter::try_from_env("WEAVE_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true)
        .init();
}
