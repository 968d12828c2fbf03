//! # mqtt-intercept
//!
//! An intercepting MQTT proxy: a transparent man-in-the-middle that accepts
//! MQTT clients over TCP or WebSocket, pairs each with an upstream broker
//! connection, and shuttles control packets between them while user-supplied
//! [`Processor`](proxy::Processor)s observe, transform, inject, or drop each
//! packet.
//!
//! Broker egress skips TLS certificate verification: the proxy is an
//! interception tool and terminates whatever the broker presents. Do not
//! point it at infrastructure you do not control.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mqtt_intercept::service::{Service, ServiceConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServiceConfig::new("ssl://broker.example.com:8883")
//!         .with_tcp_listen("0.0.0.0:1883")
//!         .with_ws_listen("0.0.0.0:443");
//!
//!     Service::new(config).run(CancellationToken::new()).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Custom interception
//!
//! A processor answers every received packet with the packets to emit, each
//! tagged with a route: `Forward` writes to the peer endpoint, `Loopback`
//! answers the sender directly. The first packet a processor sees is a
//! synthetic `Ready` marker, its chance to emit a priming batch.

pub mod awsiot;
pub mod encoding;
pub mod error;
pub mod packet;
pub mod proxy;
pub mod service;
pub mod transport;

pub use error::{ProxyError, Result};
pub use packet::{CodecError, ControlPacket, PacketType, QoS};
pub use proxy::{
    Channel, ChannelConfig, Endpoint, EndpointConfig, Errors, ForwardProcessor, Nozzle, Packet,
    PacketBody, Packets, Pipe, PipeStatus, Processor, Proxy, Route, TimeoutConfig,
};
pub use service::{Service, ServiceConfig};
pub use transport::Connection;
