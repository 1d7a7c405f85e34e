#![forbid(unsafe_code)]

mod client;
mod error;
mod types;
mod util;

pub use client::GatewayClient;
pub use error::{Error, Result, TransportErrorKind};
pub use types::{GatewayRequest, GatewayResponse};
