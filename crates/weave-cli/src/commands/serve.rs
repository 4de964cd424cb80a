use anyhow::{Context, Result};
use tracing::info;
use weave_host::KernelServer;

use crate::opts::WeaveOpts;
use crate::session::build_host;

/// Serve until the client closes stdin.
pub async fn cmd_serve(opts: &WeaveOpts) -> Result<()> {
    let host = build_host(opts).await?;
    info!(kernels = ?host.root().child_names(), "serving kernels on stdio");
    KernelServer::new(host.root().clone())
        .serve(tokio::io::stdin(), tokio::io::stdout())
        .await
        .context("serving kernels")
}
