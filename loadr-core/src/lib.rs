pub mod config;
pub mod headers;
pub mod results;
pub mod route;
pub mod runner;
pub mod workload;

pub use config::{ConfigDocument, RunMode, RunnerConfig};
pub use headers::{HeaderChain, HeaderFactory, HeaderSet};
pub use loadr_http::{GatewayClient, GatewayRequest, GatewayResponse};
pub use results::{RequestOutcome, ResultLine};
pub use route::{EndpointSelector, ServiceRef};
pub use workload::{Event, WorkloadSource};
