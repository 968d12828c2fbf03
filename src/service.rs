//! Accepts MQTT clients and pairs each with a broker connection
//!
//! Two listeners: plain TCP (optional) and WebSocket (path `/mqtt`,
//! subprotocol `mqtt`). Every accepted client gets its own broker dial,
//! its own proxy, and its own task; one pairing's outcome never affects
//! the listeners.

use crate::error::Result;
use crate::proxy::{ChannelConfig, Endpoint, EndpointConfig, ForwardProcessor, Proxy, TimeoutConfig};
use crate::transport::websocket::WebSocketServerConfig;
use crate::transport::{accept_websocket, connect_broker, Connection};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Optional plain-TCP listen address
    pub tcp_listen: Option<String>,
    /// WebSocket listen address
    pub ws_listen: String,
    /// Upstream broker URL
    pub broker: String,
    /// Per-packet deadlines applied to both sides of every pairing
    pub timeouts: TimeoutConfig,
}

impl ServiceConfig {
    #[must_use]
    pub fn new(broker: impl Into<String>) -> Self {
        Self {
            tcp_listen: None,
            ws_listen: "0.0.0.0:443".to_string(),
            broker: broker.into(),
            timeouts: TimeoutConfig::default(),
        }
    }

    #[must_use]
    pub fn with_tcp_listen(mut self, addr: impl Into<String>) -> Self {
        self.tcp_listen = Some(addr.into());
        self
    }

    #[must_use]
    pub fn with_ws_listen(mut self, addr: impl Into<String>) -> Self {
        self.ws_listen = addr.into();
        self
    }

    #[must_use]
    pub fn with_timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = timeouts;
        self
    }
}

/// MQTT intercepting proxy service
pub struct Service {
    config: ServiceConfig,
}

impl Service {
    #[must_use]
    pub fn new(config: ServiceConfig) -> Self {
        Self { config }
    }

    /// Binds the listeners and serves pairings until cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error when a listener cannot bind; per-pairing failures
    /// are logged and absorbed.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        let ws_listener = TcpListener::bind(&self.config.ws_listen).await?;
        info!(addr = %self.config.ws_listen, "WebSocket listener ready");

        if let Some(tcp_addr) = &self.config.tcp_listen {
            let tcp_listener = TcpListener::bind(tcp_addr).await?;
            info!(addr = %tcp_addr, "TCP listener ready");

            let config = self.config.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                accept_tcp(tcp_listener, config, cancel).await;
            });
        }

        accept_ws(ws_listener, self.config.clone(), cancel).await;
        Ok(())
    }
}

async fn accept_tcp(listener: TcpListener, config: ServiceConfig, cancel: CancellationToken) {
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!(%peer, "accepted TCP client");
                    let _ = stream.set_nodelay(true);
                    let config = config.clone();
                    let cancel = cancel.child_token();
                    tokio::spawn(async move {
                        serve(config, Connection::tcp(stream), None, cancel).await;
                    });
                }
                Err(err) => {
                    error!(error = %err, "TCP accept failed");
                }
            }
        }
    }
}

async fn accept_ws(listener: TcpListener, config: ServiceConfig, cancel: CancellationToken) {
    let ws_config = WebSocketServerConfig::default();
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!(%peer, "accepted WebSocket client");
                    let config = config.clone();
                    let ws_config = ws_config.clone();
                    let cancel = cancel.child_token();
                    tokio::spawn(async move {
                        match accept_websocket(stream, &ws_config).await {
                            Ok((ws, query)) => {
                                serve(config, Connection::websocket(ws), query, cancel).await;
                            }
                            Err(err) => {
                                error!(%peer, error = %err, "WebSocket upgrade failed");
                            }
                        }
                    });
                }
                Err(err) => {
                    error!(error = %err, "WebSocket accept failed");
                }
            }
        }
    }
}

/// Serves one pairing to completion.
async fn serve(
    config: ServiceConfig,
    client_conn: Connection,
    query: Option<String>,
    cancel: CancellationToken,
) {
    let peer = client_conn.peer_addr();
    debug!(?peer, broker = %config.broker, "pairing client with broker");

    let broker_conn = match connect_broker(&config.broker, query.as_deref()).await {
        Ok(conn) => conn,
        Err(err) => {
            error!(?peer, error = %err, "broker dial failed");
            return;
        }
    };

    let client_endpoint = Endpoint::new(
        EndpointConfig::new()
            .with_conn(client_conn)
            .with_timeouts(config.timeouts)
            .with_processor(Arc::new(ForwardProcessor::client())),
    );
    let broker_endpoint = Endpoint::new(
        EndpointConfig::new()
            .with_conn(broker_conn)
            .with_timeouts(config.timeouts)
            .with_processor(Arc::new(ForwardProcessor::broker())),
    );

    let (client_endpoint, broker_endpoint) = match (client_endpoint, broker_endpoint) {
        (Ok(client), Ok(broker)) => (Arc::new(client), Arc::new(broker)),
        (Err(err), _) | (_, Err(err)) => {
            error!(?peer, error = %err, "endpoint setup failed");
            return;
        }
    };

    let proxy = Proxy::new(
        ChannelConfig::new()
            .with_client_endpoint(client_endpoint)
            .with_broker_endpoint(broker_endpoint),
    );

    let outcome = proxy.run(cancel).await;
    info!(?peer, outcome = %outcome, "finished serving client");
}
