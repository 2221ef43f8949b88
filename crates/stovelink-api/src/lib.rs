//! Transports of the StoveLink bridge: HTTP, server-sent events, UDP and
//! MQTT, all funnelled into one control loop.

pub mod bridge;
pub mod error;
pub mod http;
pub mod mqtt;
pub mod server;
pub mod udp;

pub use bridge::{Bridge, BridgeHandle, BridgeRequest};
pub use error::ApiError;
pub use http::router;
pub use server::run;
