use crate::packet::CodecError;
use crate::proxy::packet::Route;
use crate::proxy::pipe::PipeStatus;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProxyError>;

/// Proxy errors
///
/// # Error Categories
///
/// - **Configuration**: `ClientEndpointNotSet`, `BrokerEndpointNotSet`,
///   `EndpointConnNotSet`, `PipeNotSet`, `PipeChannelNotSet`
/// - **Routing**: `InvalidPacketRoute`, `ProcessorNotSet`,
///   `EndpointControlPacketNotSet`
/// - **Lifecycle**: `ClientDisconnect`, `BrokerDisconnect`
/// - **Transport**: `Pipe` (wrapping a terminal [`PipeStatus`]),
///   `WriteTimeout`, `ConnectTimeout`, `Io`, `Connection`
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("client endpoint is not set")]
    ClientEndpointNotSet,

    #[error("broker endpoint is not set")]
    BrokerEndpointNotSet,

    #[error("endpoint conn is not set")]
    EndpointConnNotSet,

    #[error("endpoint control packet is not set")]
    EndpointControlPacketNotSet,

    #[error("endpoint processor is not set")]
    ProcessorNotSet,

    #[error("pipe is not set")]
    PipeNotSet,

    #[error("pipe channel is not set")]
    PipeChannelNotSet,

    #[error("invalid packet route: {0:?}")]
    InvalidPacketRoute(Route),

    #[error("client disconnect")]
    ClientDisconnect,

    #[error("broker disconnect")]
    BrokerDisconnect,

    #[error("write timeout")]
    WriteTimeout,

    #[error("connect timeout")]
    ConnectTimeout,

    #[error("pipe error: {0}")]
    Pipe(#[from] PipeStatus),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("connection error: {0}")]
    Connection(String),
}
