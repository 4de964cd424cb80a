//! Hosting for kernel trees: connectors to remote kernels, proxy kernels,
//! an NDJSON kernel server, and frontend bootstrap.

pub mod config;
pub mod connectors;
pub mod error;
pub mod host;
pub mod proxy;
pub mod server;

pub use config::HostConfig;
pub use connectors::{
    ConnectorError, ConnectorRegistry, KernelConnector, LoopbackConnector, NdjsonConnector,
};
pub use error::HostError;
pub use host::{FrontendKernels, KernelHost};
pub use proxy::ProxyKernel;
pub use server::KernelServer;
