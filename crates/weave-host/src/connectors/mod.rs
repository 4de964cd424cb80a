pub mod loopback;
pub mod ndjson;
pub mod registry;
pub mod traits;

pub use loopback::LoopbackConnector;
pub use ndjson::{ClientFrame, NdjsonConnector, ServerFrame};
pub use registry::ConnectorRegistry;
pub use traits::{ConnectorError, EventStream, KernelConnector};
